//! Flight, email, and transaction records: the timeline's source tables.

use rusqlite::params;

use crate::sqlite::{db_err, SqliteStore};
use crate::types::*;
use casefile_core::Result;

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".into())
}

/// Decode a stored JSON list; malformed text reads as empty.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

impl SqliteStore {
    pub fn add_flight(&self, flight: &NewFlight) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO flights (flight_date, origin, destination, passengers_json, aircraft, doc_id, suspicion_level) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(db_err)?
            .insert(params![
                flight.flight_date,
                flight.origin,
                flight.destination,
                to_json(&flight.passengers),
                flight.aircraft,
                flight.doc_id,
                flight.suspicion_level,
            ])
            .map_err(db_err)?;
        Ok(id)
    }

    pub fn add_email(&self, email: &NewEmail) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO emails (sent_date, sender, recipients_json, subject, doc_id, suspicion_score) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(db_err)?
            .insert(params![
                email.sent_date,
                email.sender,
                to_json(&email.recipients),
                email.subject,
                email.doc_id,
                email.suspicion_score,
            ])
            .map_err(db_err)?;
        Ok(id)
    }

    pub fn add_transaction(&self, txn: &NewTransaction) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO transactions (transaction_date, amount, currency, from_party, to_party, description, doc_id, suspicion_level) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err)?
            .insert(params![
                txn.transaction_date,
                txn.amount,
                txn.currency,
                txn.from_party,
                txn.to_party,
                txn.description,
                txn.doc_id,
                txn.suspicion_level,
            ])
            .map_err(db_err)?;
        Ok(id)
    }

    /// All flights, by id.
    pub fn list_flights(&self) -> Result<Vec<Flight>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, flight_date, origin, destination, passengers_json, aircraft, doc_id, suspicion_level \
                 FROM flights ORDER BY id",
            )
            .map_err(db_err)?;
        let flights = stmt
            .query_map([], |row| {
                Ok(Flight {
                    id: row.get(0)?,
                    record: NewFlight {
                        flight_date: row.get(1)?,
                        origin: row.get(2)?,
                        destination: row.get(3)?,
                        passengers: from_json(&row.get::<_, String>(4)?),
                        aircraft: row.get(5)?,
                        doc_id: row.get(6)?,
                        suspicion_level: row.get(7)?,
                    },
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(flights)
    }

    /// All emails, by id.
    pub fn list_emails(&self) -> Result<Vec<Email>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, sent_date, sender, recipients_json, subject, doc_id, suspicion_score \
                 FROM emails ORDER BY id",
            )
            .map_err(db_err)?;
        let emails = stmt
            .query_map([], |row| {
                Ok(Email {
                    id: row.get(0)?,
                    record: NewEmail {
                        sent_date: row.get(1)?,
                        sender: row.get(2)?,
                        recipients: from_json(&row.get::<_, String>(3)?),
                        subject: row.get(4)?,
                        doc_id: row.get(5)?,
                        suspicion_score: row.get(6)?,
                    },
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(emails)
    }

    /// All transactions, by id.
    pub fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, transaction_date, amount, currency, from_party, to_party, description, doc_id, suspicion_level \
                 FROM transactions ORDER BY id",
            )
            .map_err(db_err)?;
        let txns = stmt
            .query_map([], |row| {
                Ok(Transaction {
                    id: row.get(0)?,
                    record: NewTransaction {
                        transaction_date: row.get(1)?,
                        amount: row.get(2)?,
                        currency: row.get(3)?,
                        from_party: row.get(4)?,
                        to_party: row.get(5)?,
                        description: row.get(6)?,
                        doc_id: row.get(7)?,
                        suspicion_level: row.get(8)?,
                    },
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(txns)
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite::tests::test_store;
    use crate::types::*;

    #[test]
    fn test_flight_roundtrip() {
        let (store, _dir) = test_store();
        let id = store
            .add_flight(&NewFlight {
                flight_date: Some("03/14/2002".into()),
                origin: "TEB".into(),
                destination: "PBI".into(),
                passengers: vec!["Alice Smith".into(), "Bob Jones".into()],
                aircraft: Some("N908JE".into()),
                suspicion_level: 2,
                ..Default::default()
            })
            .unwrap();

        let flights = store.list_flights().unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].id, id);
        assert_eq!(flights[0].record.passengers, vec!["Alice Smith", "Bob Jones"]);
        assert_eq!(flights[0].record.flight_date.as_deref(), Some("03/14/2002"));
    }

    #[test]
    fn test_email_and_transaction() {
        let (store, _dir) = test_store();
        store
            .add_email(&NewEmail {
                sent_date: None,
                sender: "a@example.com".into(),
                recipients: vec!["b@example.com".into()],
                subject: "Re: schedule".into(),
                doc_id: None,
                suspicion_score: 6.5,
            })
            .unwrap();
        store
            .add_transaction(&NewTransaction {
                transaction_date: Some("2004-06-01".into()),
                amount: 25_000.0,
                currency: "USD".into(),
                from_party: "Acme Holdings".into(),
                to_party: "Bob Jones".into(),
                ..Default::default()
            })
            .unwrap();

        let emails = store.list_emails().unwrap();
        assert_eq!(emails[0].record.recipients, vec!["b@example.com"]);
        assert!(emails[0].record.sent_date.is_none());
        assert_eq!(emails[0].record.suspicion_score, 6.5);

        let txns = store.list_transactions().unwrap();
        assert_eq!(txns[0].record.amount, 25_000.0);
        assert_eq!(txns[0].record.to_party, "Bob Jones");
    }

    #[test]
    fn test_record_doc_link_cleared_on_delete() {
        let (store, _dir) = test_store();
        let doc = store.add_document("log.txt", "flight log", Default::default()).unwrap();
        store
            .add_flight(&NewFlight {
                flight_date: Some("2002-03-14".into()),
                doc_id: Some(doc),
                ..Default::default()
            })
            .unwrap();
        store.delete_document(doc).unwrap();
        assert_eq!(store.list_flights().unwrap()[0].record.doc_id, None);
    }
}
