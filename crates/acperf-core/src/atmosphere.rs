//! Standard atmosphere and wind helpers.
//!
//! Rule-of-thumb approximations as printed in light-aircraft flight
//! manuals, not the full ICAO model.

/// ISA sea-level temperature, °C
pub const ISA_SEA_LEVEL_TEMP_C: f64 = 15.0;
/// ISA lapse rate, °C per 1000 ft
pub const ISA_LAPSE_C_PER_1000FT: f64 = 2.0;
/// Standard sea-level pressure, hPa
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;
/// Pressure altitude change per hPa of QNH deviation, ft
pub const FT_PER_HPA: f64 = 30.0;
/// Density altitude change per °C of ISA deviation, ft
pub const FT_PER_DEG_ISA_DEVIATION: f64 = 120.0;

/// ISA temperature at a pressure altitude.
pub fn isa_temperature_c(pressure_altitude_ft: f64) -> f64 {
    ISA_SEA_LEVEL_TEMP_C - ISA_LAPSE_C_PER_1000FT * pressure_altitude_ft / 1000.0
}

pub fn isa_deviation_c(pressure_altitude_ft: f64, temperature_c: f64) -> f64 {
    temperature_c - isa_temperature_c(pressure_altitude_ft)
}

/// Pressure altitude from field elevation and QNH.
pub fn pressure_altitude_ft(elevation_ft: f64, qnh_hpa: f64) -> f64 {
    elevation_ft + (STANDARD_PRESSURE_HPA - qnh_hpa) * FT_PER_HPA
}

pub fn density_altitude_ft(pressure_altitude_ft: f64, temperature_c: f64) -> f64 {
    pressure_altitude_ft
        + FT_PER_DEG_ISA_DEVIATION * isa_deviation_c(pressure_altitude_ft, temperature_c)
}

/// Headwind component along the runway, kt. Negative values are tailwind.
///
/// `wind_from_deg` is the direction the wind blows from.
pub fn headwind_component(wind_from_deg: f64, wind_speed_kt: f64, runway_heading_deg: f64) -> f64 {
    let angle = (wind_from_deg - runway_heading_deg).to_radians();
    wind_speed_kt * angle.cos()
}

/// Crosswind component, kt. Positive = from the right.
pub fn crosswind_component(wind_from_deg: f64, wind_speed_kt: f64, runway_heading_deg: f64) -> f64 {
    let angle = (wind_from_deg - runway_heading_deg).to_radians();
    wind_speed_kt * angle.sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isa_temperature() {
        assert_eq!(isa_temperature_c(0.0), 15.0);
        assert_eq!(isa_temperature_c(5000.0), 5.0);
        assert_eq!(isa_deviation_c(5000.0, 20.0), 15.0);
    }

    #[test]
    fn test_pressure_and_density_altitude() {
        assert_eq!(pressure_altitude_ft(1000.0, 1013.25), 1000.0);
        assert!((pressure_altitude_ft(1000.0, 1003.25) - 1300.0).abs() < 1e-9);
        // ISA+10 at 2000 ft adds 1200 ft
        assert!((density_altitude_ft(2000.0, 21.0) - 3200.0).abs() < 1e-9);
    }

    #[test]
    fn test_wind_components() {
        // Straight down the runway
        assert!((headwind_component(270.0, 10.0, 270.0) - 10.0).abs() < 1e-9);
        // Tailwind
        assert!((headwind_component(90.0, 10.0, 270.0) + 10.0).abs() < 1e-9);
        // 30 degrees off the nose
        let hw = headwind_component(300.0, 20.0, 270.0);
        let xw = crosswind_component(300.0, 20.0, 270.0);
        assert!((hw - 17.320508).abs() < 1e-5);
        assert!((xw - 10.0).abs() < 1e-9);
    }
}
