//! The historical job request shape and its validation rules, applied
//! defensively inside the recorder even though the HTTP control plane
//! that normally enforces them is an external collaborator out of scope
//! here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub event_id: String,
    pub contract_address: String,
    pub from_block: i64,
    pub to_block: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackfillRequestError {
    #[error("event_id must not be empty")]
    EmptyEventId,
    #[error("contract_address must not be empty")]
    EmptyContractAddress,
    #[error("from_block and to_block must be non-negative")]
    NegativeBlock,
    #[error("from_block must not be greater than to_block")]
    FromAfterTo,
}

impl BackfillRequest {
    /// The 400-style validation rules: reject empty strings, negative
    /// block numbers, or an inverted range.
    pub fn validate(&self) -> Result<(), BackfillRequestError> {
        if self.event_id.is_empty() {
            return Err(BackfillRequestError::EmptyEventId);
        }
        if self.contract_address.is_empty() {
            return Err(BackfillRequestError::EmptyContractAddress);
        }
        if self.from_block < 0 || self.to_block < 0 {
            return Err(BackfillRequestError::NegativeBlock);
        }
        if self.from_block > self.to_block {
            return Err(BackfillRequestError::FromAfterTo);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> BackfillRequest {
        BackfillRequest {
            event_id: "uniswap-v3-pool-swap".to_string(),
            contract_address: "0x1111111111111111111111111111111111111111".to_string(),
            from_block: 100,
            to_block: 200,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn rejects_empty_event_id() {
        let request = BackfillRequest { event_id: String::new(), ..valid_request() };
        assert_eq!(request.validate(), Err(BackfillRequestError::EmptyEventId));
    }

    #[test]
    fn rejects_negative_block() {
        let request = BackfillRequest { from_block: -1, ..valid_request() };
        assert_eq!(request.validate(), Err(BackfillRequestError::NegativeBlock));
    }

    #[test]
    fn rejects_inverted_range() {
        let request = BackfillRequest { from_block: 200, to_block: 100, ..valid_request() };
        assert_eq!(request.validate(), Err(BackfillRequestError::FromAfterTo));
    }
}
