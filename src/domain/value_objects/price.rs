use crate::domain::errors::ValidationError;

/// Strictly positive, finite price
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value > 0.0 {
            Ok(Price(value))
        } else {
            Err(ValidationError::InvalidPrice(format!(
                "{} (must be positive)",
                value
            )))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_new_valid() {
        let price = Price::new(50000.0).unwrap();
        assert_eq!(price.value(), 50000.0);
    }

    #[test]
    fn test_price_rejects_zero_and_negative() {
        assert!(Price::new(0.0).is_err());
        assert!(Price::new(-10.0).is_err());
    }

    #[test]
    fn test_price_rejects_nan() {
        assert_eq!(Price::new(f64::NAN), Err(ValidationError::MustBeFinite));
        assert_eq!(Price::new(f64::INFINITY), Err(ValidationError::MustBeFinite));
    }
}
