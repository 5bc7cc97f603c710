//! Maps raw broker operations onto the closed `OperationKind` set.
//!
//! Unknown kinds are rejected: a misclassified row corrupts every position
//! computed after it.

use super::{ReconstructError, MAX_LOTS};
use crate::domain::{Decimal, InstrumentId, Operation, OperationKind, RawOperation};

/// Accepted spellings per kind. ASCII entries match case-insensitively.
const KIND_ALIASES: &[(&str, OperationKind)] = &[
    ("OPERATION_TYPE_BUY", OperationKind::Buy),
    ("OPERATION_TYPE_BUY_CARD", OperationKind::Buy),
    ("OPERATION_TYPE_SELL", OperationKind::Sell),
    ("OPERATION_TYPE_SELL_CARD", OperationKind::Sell),
    ("OPERATION_TYPE_BROKER_FEE", OperationKind::Fee),
    ("OPERATION_TYPE_ACCRUING_VARMARGIN", OperationKind::MarginCredit),
    ("OPERATION_TYPE_WRITING_OFF_VARMARGIN", OperationKind::MarginDebit),
    ("buy", OperationKind::Buy),
    ("sell", OperationKind::Sell),
    ("fee", OperationKind::Fee),
    ("marginCredit", OperationKind::MarginCredit),
    ("marginDebit", OperationKind::MarginDebit),
    ("Покупка ценных бумаг", OperationKind::Buy),
    ("Продажа ценных бумаг", OperationKind::Sell),
    ("Удержание комиссии за операцию", OperationKind::Fee),
    ("Зачисление вариационной маржи", OperationKind::MarginCredit),
    ("Списание вариационной маржи", OperationKind::MarginDebit),
];

/// Resolve a raw kind string, or None if it is outside the closed set.
pub fn kind_from_raw(raw_kind: &str) -> Option<OperationKind> {
    let raw_kind = raw_kind.trim();
    KIND_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(raw_kind))
        .map(|(_, kind)| *kind)
}

/// Classify and normalize a single raw operation.
///
/// # Errors
/// `UnclassifiedOperation` for unknown kinds, `NegativeQuantity` for negative
/// lot counts, `QuantityOutOfRange` above `MAX_LOTS`, `MissingInstrument` for
/// a Buy/Sell without an instrument id.
pub fn classify(raw: &RawOperation) -> Result<Operation, ReconstructError> {
    let id = raw.operation_key();
    let kind = kind_from_raw(&raw.kind).ok_or_else(|| ReconstructError::UnclassifiedOperation {
        id: id.clone(),
        kind: raw.kind.clone(),
    })?;

    if raw.quantity < 0 {
        return Err(ReconstructError::NegativeQuantity {
            id,
            quantity: raw.quantity,
        });
    }
    if raw.quantity > MAX_LOTS {
        return Err(ReconstructError::QuantityOutOfRange {
            id,
            quantity: raw.quantity,
        });
    }

    let instrument_id = InstrumentId::new(raw.instrument_id.trim());
    let payment = raw.payment.abs();

    let op = match kind {
        OperationKind::Buy | OperationKind::Sell => {
            if instrument_id.is_empty() {
                return Err(ReconstructError::MissingInstrument { id });
            }
            Operation {
                id,
                timestamp: raw.timestamp,
                instrument_id,
                kind,
                quantity: raw.quantity,
                unit_price: raw.price,
                amount: if kind == OperationKind::Buy {
                    -payment
                } else {
                    payment
                },
            }
        }
        OperationKind::Fee => Operation {
            id,
            timestamp: raw.timestamp,
            instrument_id,
            kind,
            quantity: 0,
            unit_price: Decimal::zero(),
            amount: -payment,
        },
        OperationKind::MarginCredit | OperationKind::MarginDebit => Operation {
            id,
            timestamp: raw.timestamp,
            instrument_id: InstrumentId::none(),
            kind,
            quantity: 0,
            unit_price: Decimal::zero(),
            amount: if kind == OperationKind::MarginCredit {
                payment
            } else {
                -payment
            },
        },
    };

    Ok(op)
}

/// Classify a whole window; the first failure aborts.
pub fn classify_all(raws: &[RawOperation]) -> Result<Vec<Operation>, ReconstructError> {
    raws.iter().map(classify).collect()
}
