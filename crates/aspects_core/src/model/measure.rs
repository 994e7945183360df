//! Measurement unit registry.
//!
//! # Responsibility
//! - Associate known measure names with their storage base type.
//! - Back the measure/base-type consistency validation.
//!
//! # Invariants
//! - Registry lookup is by exact measure name.
//! - Unit conversion tables are an external concern and live elsewhere.

use crate::model::aspect::BaseType;

/// One registered measurement unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    /// Canonical unit name, the value stored on aspects.
    pub name: &'static str,
    /// Display symbol.
    pub symbol: &'static str,
    /// Base type every value of this unit is stored as.
    pub base_type: BaseType,
}

const fn decimal(name: &'static str, symbol: &'static str) -> Measure {
    Measure {
        name,
        symbol,
        base_type: BaseType::Decimal,
    }
}

/// All units known to the taxonomy, grouped by physical quantity.
pub const MEASURES: &[Measure] = &[
    // Length
    decimal("Kilometre", "km"),
    decimal("Metre", "m"),
    decimal("Decimetre", "dm"),
    decimal("Centimetre", "cm"),
    decimal("Millimetre", "mm"),
    decimal("Micrometre", "µm"),
    decimal("Inch", "inch"),
    decimal("Foot", "ft"),
    decimal("Yard", "yard"),
    decimal("Mile", "mile"),
    // Mass
    decimal("Gram", "g"),
    decimal("Kilogram", "kg"),
    decimal("Tonne", "t"),
    decimal("Pound", "lb"),
    // Time
    decimal("Second", "s"),
    decimal("Minute", "min"),
    decimal("Hour", "h"),
    decimal("Day", "d"),
    // Temperature
    decimal("Celsius", "°C"),
    decimal("Fahrenheit", "°F"),
    decimal("Kelvin", "K"),
    // Electric
    decimal("Ampere", "A"),
    decimal("Volt", "V"),
    decimal("Watt", "W"),
    // Ratio
    decimal("Percent", "%"),
];

/// Looks up one unit by canonical name.
pub fn find_measure(name: &str) -> Option<&'static Measure> {
    MEASURES.iter().find(|measure| measure.name == name)
}
