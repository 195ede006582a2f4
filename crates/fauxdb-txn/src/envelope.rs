use bson::{Bson, Document};

use crate::error::{Result, TxnError};
use crate::manager::SessionId;

/// The transaction-related fields attached to a command, per spec GLOSSARY
/// "Envelope". A command carries one iff it sets `lsid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnEnvelope {
    pub session_id: SessionId,
    pub txn_number: Option<i64>,
    pub start_transaction: bool,
}

/// Parse the envelope fields off a command document. Returns `None` if the
/// command carries no `lsid` at all (an ordinary non-transactional command).
pub fn parse_envelope(command: &Document) -> Result<Option<TxnEnvelope>> {
    let Some(lsid) = command.get("lsid") else {
        return Ok(None);
    };
    let lsid_doc = match lsid {
        Bson::Document(d) => d,
        _ => return Err(TxnError::BadValue("lsid must be a document".into())),
    };
    let session_id = SessionId::from_lsid(lsid_doc)?;

    let txn_number = match command.get("txnNumber") {
        None => None,
        Some(Bson::Int32(n)) => Some(*n as i64),
        Some(Bson::Int64(n)) => Some(*n),
        Some(Bson::Double(d)) if d.fract() == 0.0 => Some(*d as i64),
        Some(_) => return Err(TxnError::BadValue("txnNumber must be an integer".into())),
    };

    match command.get("autocommit") {
        None => {}
        Some(Bson::Boolean(false)) => {}
        Some(Bson::Boolean(true)) => {
            return Err(TxnError::BadValue("autocommit must be false when present".into()));
        }
        Some(_) => return Err(TxnError::BadValue("autocommit must be a boolean".into())),
    }

    let start_transaction = match command.get("startTransaction") {
        None => false,
        Some(Bson::Boolean(true)) => true,
        Some(Bson::Boolean(false)) => {
            return Err(TxnError::BadValue("startTransaction must be true when present".into()));
        }
        Some(_) => return Err(TxnError::BadValue("startTransaction must be a boolean".into())),
    };

    Ok(Some(TxnEnvelope {
        session_id,
        txn_number,
        start_transaction,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn no_lsid_means_no_envelope() {
        assert_eq!(parse_envelope(&doc! { "ping": 1 }).unwrap(), None);
    }

    #[test]
    fn rejects_autocommit_true() {
        let cmd = doc! { "lsid": { "id": 1 }, "autocommit": true };
        assert!(parse_envelope(&cmd).is_err());
    }

    #[test]
    fn rejects_non_integral_txn_number() {
        let cmd = doc! { "lsid": { "id": 1 }, "txnNumber": 1.5 };
        assert!(parse_envelope(&cmd).is_err());
    }

    #[test]
    fn parses_start_transaction() {
        let cmd = doc! { "lsid": { "id": 1 }, "txnNumber": 4i64, "autocommit": false, "startTransaction": true };
        let env = parse_envelope(&cmd).unwrap().unwrap();
        assert_eq!(env.txn_number, Some(4));
        assert!(env.start_transaction);
    }
}
