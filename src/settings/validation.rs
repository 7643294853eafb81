// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Validation callbacks for settings

use std::fmt::Display;

/// A validation callback: `None` when the value is acceptable, the reason otherwise
pub type Validation<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Accept only the given values
///
/// ```
/// use devkit::settings::in_sequence;
///
/// let check = in_sequence(["dev", "prod"].map(String::from));
/// assert_eq!(check(&"dev".to_string()), None);
/// assert_eq!(
///     check(&"qa".to_string()).as_deref(),
///     Some("Valid values are : dev, prod")
/// );
/// ```
pub fn in_sequence<T>(valid: impl IntoIterator<Item = T>) -> impl Fn(&T) -> Option<String> + Send + Sync
where
    T: PartialEq + Display + Send + Sync,
{
    let valid: Vec<T> = valid.into_iter().collect();
    move |value| {
        if valid.contains(value) {
            None
        } else {
            let values = valid
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("Valid values are : {values}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_sequence_numbers() {
        let check = in_sequence([1.0, 2.0, 3.0]);
        assert_eq!(check(&2.0), None);
        assert_eq!(check(&4.0).as_deref(), Some("Valid values are : 1, 2, 3"));
    }
}
