use serde::{Deserialize, Serialize};

use super::errors::{FieldViolation, OrderError};
use super::value_objects::{OrderItem, ShippingAddress};

// ============================================================================
// Order Draft - what a customer submits before an order exists
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
}

impl OrderDraft {
    /// Check every structural constraint and report all violations at once,
    /// not just the first one.
    pub fn validate(&self) -> Result<(), OrderError> {
        let mut violations = Vec::new();

        if self.customer_id.trim().is_empty() {
            violations.push(FieldViolation::new("customerId", "must not be blank"));
        }

        if self.items.is_empty() {
            violations.push(FieldViolation::new("items", "must contain at least one item"));
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.isbn.trim().is_empty() {
                violations.push(FieldViolation::new(
                    format!("items[{index}].isbn"),
                    "must not be blank",
                ));
            }
            if item.quantity == 0 {
                violations.push(FieldViolation::new(
                    format!("items[{index}].quantity"),
                    "must be a positive integer",
                ));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                violations.push(FieldViolation::new(
                    format!("items[{index}].price"),
                    "must be a non-negative number",
                ));
            }
        }

        let address_fields = [
            ("shippingAddress.street", &self.shipping_address.street),
            ("shippingAddress.city", &self.shipping_address.city),
            ("shippingAddress.country", &self.shipping_address.country),
            ("shippingAddress.zipCode", &self.shipping_address.zip_code),
        ];
        for (field, value) in address_fields {
            if value.trim().is_empty() {
                violations.push(FieldViolation::new(field, "must not be blank"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(OrderError::Validation(violations))
        }
    }

    /// Sum of price x quantity over all items.
    pub fn total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn valid_draft() -> OrderDraft {
        OrderDraft {
            customer_id: "customer-42".into(),
            items: vec![
                OrderItem {
                    isbn: "978-0134685991".into(),
                    quantity: 2,
                    price: 10.0,
                },
                OrderItem {
                    isbn: "978-1593278281".into(),
                    quantity: 1,
                    price: 25.5,
                },
            ],
            shipping_address: ShippingAddress {
                street: "1 Library Way".into(),
                city: "Springfield".into(),
                country: "US".into(),
                zip_code: "12345".into(),
            },
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(valid_draft().validate().is_ok());
    }

    #[test]
    fn total_sums_line_totals() {
        assert_eq!(valid_draft().total(), 45.5);
    }

    #[test]
    fn empty_items_rejected() {
        let mut draft = valid_draft();
        draft.items.clear();

        let Err(OrderError::Validation(violations)) = draft.validate() else {
            panic!("expected validation error");
        };
        assert!(violations.iter().any(|v| v.field == "items"));
    }

    #[test]
    fn every_violation_is_reported() {
        let mut draft = valid_draft();
        draft.customer_id = "  ".into();
        draft.items[0].quantity = 0;
        draft.items[1].price = -1.0;
        draft.shipping_address.city = String::new();
        draft.shipping_address.zip_code = String::new();

        let Err(OrderError::Validation(violations)) = draft.validate() else {
            panic!("expected validation error");
        };

        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"customerId"));
        assert!(fields.contains(&"items[0].quantity"));
        assert!(fields.contains(&"items[1].price"));
        assert!(fields.contains(&"shippingAddress.city"));
        assert!(fields.contains(&"shippingAddress.zipCode"));
        assert_eq!(violations.len(), 5);
    }

    #[test]
    fn non_finite_price_rejected() {
        let mut draft = valid_draft();
        draft.items[0].price = f64::NAN;

        let Err(OrderError::Validation(violations)) = draft.validate() else {
            panic!("expected validation error");
        };
        assert!(violations.iter().any(|v| v.field == "items[0].price"));
    }

    #[test]
    fn draft_deserializes_from_wire_shape() {
        let json = r#"{
            "customerId": "customer-1",
            "items": [{"isbn": "A", "quantity": 2, "price": 10.0}],
            "shippingAddress": {
                "street": "1 Main St", "city": "Metropolis",
                "country": "US", "zipCode": "00001"
            }
        }"#;

        let draft: OrderDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.customer_id, "customer-1");
        assert_eq!(draft.items[0].quantity, 2);
        assert_eq!(draft.shipping_address.zip_code, "00001");
    }
}
