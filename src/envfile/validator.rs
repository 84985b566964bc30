use crate::models::{VariableRegistry, VariableType};

/// Check a candidate value against a variable's declared rule.
///
/// Advisory only: an invalid value never blocks rendering or saving.
///
/// - Empty values are always valid (unset, use the default).
/// - Unknown variables and variables without a rule are always valid.
/// - Integer variables with a range must also parse as base-10 and fall
///   inside the inclusive range.
pub fn is_valid(registry: &VariableRegistry, name: &str, value: &str) -> bool {
    if value.is_empty() {
        return true;
    }

    let Some(definition) = registry.lookup(name) else {
        return true;
    };
    let Some(pattern) = registry.pattern(name) else {
        return true;
    };

    if !pattern.is_match(value) {
        return false;
    }

    match (definition.var_type, definition.range) {
        (VariableType::Integer, Some((min, max))) => match value.parse::<i64>() {
            Ok(number) => (min..=max).contains(&number),
            Err(_) => false,
        },
        _ => true,
    }
}
