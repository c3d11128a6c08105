use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("variant is out of stock")]
    OutOfStock,
}

/// Quantity a buyer may hold of a variant: never more than what is in stock.
pub fn clamp_quantity(requested: i32, stock: i32) -> Result<i32, CartError> {
    if requested <= 0 {
        return Err(CartError::InvalidQuantity(requested));
    }
    if stock <= 0 {
        return Err(CartError::OutOfStock);
    }
    Ok(requested.min(stock))
}

/// Adds `added` to what is already in the cart, clamped to stock.
pub fn merge_quantity(existing: i32, added: i32, stock: i32) -> Result<i32, CartError> {
    if added <= 0 {
        return Err(CartError::InvalidQuantity(added));
    }
    clamp_quantity(existing.max(0).saturating_add(added), stock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clamps_to_stock() {
        assert_eq!(clamp_quantity(10, 3), Ok(3));
        assert_eq!(clamp_quantity(2, 3), Ok(2));
    }

    #[test]
    fn out_of_stock_variant_cannot_be_added() {
        assert_eq!(clamp_quantity(1, 0), Err(CartError::OutOfStock));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        assert_eq!(clamp_quantity(0, 5), Err(CartError::InvalidQuantity(0)));
    }

    #[test]
    fn merging_adds_then_clamps() {
        assert_eq!(merge_quantity(2, 2, 10), Ok(4));
        assert_eq!(merge_quantity(4, 9, 10), Ok(10));
        assert_eq!(merge_quantity(i32::MAX, 1, 7), Ok(7));
    }
}
