use crate::models::delivery::ItemDetails;

pub const BASE_FARE: f64 = 10.0;
const PER_KM_RATE: f64 = 2.5;
const OVERWEIGHT_THRESHOLD: f64 = 5.0;
const OVERWEIGHT_RATE: f64 = 1.5;
const INSURANCE_THRESHOLD: f64 = 500.0;
const INSURANCE_RATE: f64 = 0.02;

/// Prices are quoted in half units of currency.
const PRICE_STEP: f64 = 0.5;
const ROUNDING_TOLERANCE: f64 = 1e-9;

/// Quote for moving `item` over `distance_km`. Total over every input:
/// missing weight or value add nothing.
pub fn quote(distance_km: f64, item: &ItemDetails) -> f64 {
    let raw = BASE_FARE
        + distance_km.max(0.0) * PER_KM_RATE
        + overweight_surcharge(item.weight)
        + insurance_surcharge(item.value);

    round_up_to_step(raw)
}

fn overweight_surcharge(weight: Option<f64>) -> f64 {
    match weight {
        Some(weight) if weight > OVERWEIGHT_THRESHOLD => {
            (weight - OVERWEIGHT_THRESHOLD) * OVERWEIGHT_RATE
        }
        _ => 0.0,
    }
}

fn insurance_surcharge(value: Option<f64>) -> f64 {
    match value {
        Some(value) if value > INSURANCE_THRESHOLD => value * INSURANCE_RATE,
        _ => 0.0,
    }
}

/// Ceiling to the next half unit, ignoring float noise just above a step.
pub fn round_up_to_step(raw: f64) -> f64 {
    let steps = raw / PRICE_STEP;
    (steps - ROUNDING_TOLERANCE).ceil() * PRICE_STEP
}
