//! Interpretation of decoded QR text.
//!
//! Two encodings are accepted:
//!
//! - a bare ticket identifier, e.g. `T-101`
//! - a JSON object `{"ticketId": "T-101", ...}` with optional display fields
//!   named like the stored record (`userName`, `userEmail`, `eventName`,
//!   `eventDate`, `eventLocation`, `photoURL`)
//!
//! Text that starts like JSON is always treated as JSON, so a damaged JSON
//! payload is reported instead of being looked up as an identifier.

use crate::types::{ScanOverlay, TicketId, TicketIdError};
use serde_json::{Map, Value};

/// A decoded payload, ready for lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPayload {
    /// Ticket to look up
    pub ticket_id: TicketId,
    /// Display hints from the QR code
    pub overlay: ScanOverlay,
}

/// Why decoded text could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Nothing but whitespace
    #[error("QR Code is empty.")]
    Empty,
    /// Looked like JSON but did not parse
    #[error("Invalid QR Code format.")]
    InvalidJson,
    /// Parsed as JSON, but not an object
    #[error("Invalid QR Code format.")]
    NotAnObject,
    /// JSON object without a usable `ticketId`
    #[error("QR Code missing ticketId.")]
    MissingTicketId,
    /// Identifier present but unusable as a document key
    #[error("Invalid ticket id in QR Code: {0}")]
    InvalidTicketId(#[from] TicketIdError),
}

impl ScanPayload {
    /// Interpret decoded QR text
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] describing why the text is unusable.
    pub fn parse(text: &str) -> Result<Self, PayloadError> {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(PayloadError::Empty);
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Self::parse_json(trimmed);
        }

        Ok(Self {
            ticket_id: trimmed.parse()?,
            overlay: ScanOverlay::default(),
        })
    }

    fn parse_json(text: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(text).map_err(|_| PayloadError::InvalidJson)?;
        let Value::Object(fields) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let ticket_id = match fields.get("ticketId") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.parse()?,
            _ => return Err(PayloadError::MissingTicketId),
        };

        Ok(Self {
            ticket_id,
            overlay: overlay_from(&fields),
        })
    }
}

// Non-string hint values are ignored rather than rejected
fn overlay_from(fields: &Map<String, Value>) -> ScanOverlay {
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    ScanOverlay {
        holder_name: text("userName"),
        holder_email: text("userEmail"),
        event_name: text("eventName"),
        event_date: text("eventDate"),
        event_location: text("eventLocation"),
        photo_url: text("photoURL"),
    }
}
