//! Mass and balance from a load sheet.
//!
//! Produces zero-fuel, takeoff and landing weight/CG so the envelope can be
//! checked at each stage of the leg.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DataIntegrityError, LoadingError};
use crate::models::FlightConditions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    #[default]
    Avgas,
    JetA1,
    Mogas,
}

impl FuelType {
    /// Nominal density, kg/l
    pub fn density_kg_per_l(self) -> f64 {
        match self {
            FuelType::Avgas => 0.72,
            FuelType::JetA1 => 0.84,
            FuelType::Mogas => 0.74,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingStation {
    pub id: String,
    pub arm_m: f64,
    #[serde(default)]
    pub max_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelSystem {
    pub arm_m: f64,
    #[serde(default)]
    pub fuel_type: FuelType,
    #[serde(default)]
    pub usable_capacity_l: Option<f64>,
}

impl FuelSystem {
    pub fn mass_kg(&self, volume_l: f64) -> f64 {
        volume_l * self.fuel_type.density_kg_per_l()
    }
}

/// Per-aircraft mass and balance data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassBalanceData {
    pub empty_weight_kg: f64,
    pub empty_arm_m: f64,
    pub stations: Vec<LoadingStation>,
    pub fuel: FuelSystem,
}

/// Loads for one flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadSheet {
    /// kg per station id
    #[serde(default)]
    pub loads: BTreeMap<String, f64>,
    #[serde(default)]
    pub fuel_l: f64,
    #[serde(default)]
    pub trip_fuel_l: f64,
}

impl LoadSheet {
    pub fn with_load(mut self, station: impl Into<String>, kg: f64) -> Self {
        self.loads.insert(station.into(), kg);
        self
    }

    pub fn with_fuel(mut self, fuel_l: f64, trip_fuel_l: f64) -> Self {
        self.fuel_l = fuel_l;
        self.trip_fuel_l = trip_fuel_l;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MassBalance {
    pub weight_kg: f64,
    pub moment_kg_m: f64,
    pub cg_m: f64,
}

impl MassBalance {
    fn from_moment(weight_kg: f64, moment_kg_m: f64) -> Self {
        Self {
            weight_kg,
            moment_kg_m,
            cg_m: if weight_kg > 0.0 {
                moment_kg_m / weight_kg
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadingSummary {
    pub zero_fuel: MassBalance,
    pub takeoff: MassBalance,
    pub landing: MassBalance,
}

impl LoadingSummary {
    /// Copy takeoff and landing weight/CG into `conditions`.
    pub fn apply_to(&self, conditions: &mut FlightConditions) {
        conditions.weight_kg = self.takeoff.weight_kg;
        conditions.cg_m = Some(self.takeoff.cg_m);
        conditions.landing_weight_kg = Some(self.landing.weight_kg);
        conditions.landing_cg_m = Some(self.landing.cg_m);
        conditions.trip_fuel_kg = Some(self.takeoff.weight_kg - self.landing.weight_kg);
    }
}

impl MassBalanceData {
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let invalid = |msg: String| DataIntegrityError::InvalidMassBalance(msg);
        if !self.empty_weight_kg.is_finite() || self.empty_weight_kg <= 0.0 {
            return Err(invalid("empty weight must be positive".to_string()));
        }
        if !self.empty_arm_m.is_finite() || !self.fuel.arm_m.is_finite() {
            return Err(invalid("arms must be finite".to_string()));
        }
        for (i, station) in self.stations.iter().enumerate() {
            if self.stations[..i].iter().any(|s| s.id == station.id) {
                return Err(invalid(format!("duplicate station '{}'", station.id)));
            }
            if !station.arm_m.is_finite() {
                return Err(invalid(format!("station '{}' arm must be finite", station.id)));
            }
            if matches!(station.max_kg, Some(max) if !(max.is_finite() && max >= 0.0)) {
                return Err(invalid(format!("station '{}' maximum is invalid", station.id)));
            }
        }
        if matches!(self.fuel.usable_capacity_l, Some(c) if !(c.is_finite() && c >= 0.0)) {
            return Err(invalid("fuel capacity is invalid".to_string()));
        }
        Ok(())
    }

    /// Weight and CG at zero fuel, takeoff and landing.
    pub fn compute(&self, sheet: &LoadSheet) -> Result<LoadingSummary, LoadingError> {
        let mut weight = self.empty_weight_kg;
        let mut moment = self.empty_weight_kg * self.empty_arm_m;

        for (id, &kg) in &sheet.loads {
            if !kg.is_finite() || kg < 0.0 {
                return Err(LoadingError::InvalidLoad(id.clone()));
            }
            let station = self
                .stations
                .iter()
                .find(|s| &s.id == id)
                .ok_or_else(|| LoadingError::UnknownStation(id.clone()))?;
            if let Some(max_kg) = station.max_kg {
                if kg > max_kg {
                    return Err(LoadingError::StationOverload {
                        station: id.clone(),
                        load_kg: kg,
                        max_kg,
                    });
                }
            }
            weight += kg;
            moment += kg * station.arm_m;
        }

        for (label, volume) in [("fuel", sheet.fuel_l), ("trip fuel", sheet.trip_fuel_l)] {
            if !volume.is_finite() || volume < 0.0 {
                return Err(LoadingError::InvalidLoad(label.to_string()));
            }
        }
        if let Some(capacity_l) = self.fuel.usable_capacity_l {
            if sheet.fuel_l > capacity_l {
                return Err(LoadingError::FuelOverload {
                    fuel_l: sheet.fuel_l,
                    capacity_l,
                });
            }
        }
        if sheet.trip_fuel_l > sheet.fuel_l {
            return Err(LoadingError::TripFuelExceedsFuel);
        }

        let zero_fuel = MassBalance::from_moment(weight, moment);
        let with_fuel = |volume_l: f64| {
            let fuel_kg = self.fuel.mass_kg(volume_l);
            MassBalance::from_moment(weight + fuel_kg, moment + fuel_kg * self.fuel.arm_m)
        };

        Ok(LoadingSummary {
            zero_fuel,
            takeoff: with_fuel(sheet.fuel_l),
            landing: with_fuel(sheet.fuel_l - sheet.trip_fuel_l),
        })
    }
}
