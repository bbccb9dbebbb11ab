use serde::Serialize;

/// Payment state of an order, mapped once from the backend's status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Pending,
    Succeeded,
    Cancelled,
}

impl OrderStatus {
    /// Unrecognised strings stay `Pending`.
    pub fn from_remote(raw: &str) -> Self {
        match raw {
            "Pembayaran Berhasil" => Self::Succeeded,
            "Pembayaran Dibatalkan" => Self::Cancelled,
            // Unverified: the gateway's "Challenged" (fraud review) has no
            // documented meaning for this app and is handled as a cancel.
            "Challenged" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Move to `next` unless already terminal. Returns whether it changed.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        *self = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_remote_mapping() {
        assert_eq!(OrderStatus::from_remote("Pembayaran Berhasil"), OrderStatus::Succeeded);
        assert_eq!(OrderStatus::from_remote("Pembayaran Dibatalkan"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_remote("Challenged"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_remote("Menunggu Pembayaran"), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_remote(""), OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut status = OrderStatus::Pending;
        assert!(!status.advance(OrderStatus::Pending));
        assert!(status.advance(OrderStatus::Succeeded));
        assert!(!status.advance(OrderStatus::Cancelled));
        assert!(!status.advance(OrderStatus::Pending));
        assert_eq!(status, OrderStatus::Succeeded);
    }
}
