//! Domain types for ticket validation.
//!
//! The store-owned [`Ticket`] and the QR-provided [`ScanOverlay`] are kept
//! apart and only combined into a [`TicketDetails`] view for display, so
//! nothing read from a QR code can reach a persisted record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Longest identifier the document store accepts as a document key
pub const MAX_TICKET_ID_BYTES: usize = 1500;

/// Externally assigned ticket identifier (document key in the tickets collection)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

/// Reasons a string is not a usable ticket identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketIdError {
    /// Blank after trimming
    #[error("ticket id is empty")]
    Empty,
    /// Contains a path separator, which would address a different document
    #[error("ticket id must not contain '/'")]
    PathSeparator,
    /// `.` or `..`, which a URL path would resolve to a different document
    #[error("ticket id must not be '.' or '..'")]
    DotSegment,
    /// Longer than [`MAX_TICKET_ID_BYTES`]
    #[error("ticket id exceeds {MAX_TICKET_ID_BYTES} bytes")]
    TooLong,
}

impl TicketId {
    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TicketId {
    type Err = TicketIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TicketIdError::Empty);
        }
        if trimmed.contains('/') {
            return Err(TicketIdError::PathSeparator);
        }
        if matches!(trimmed, "." | "..") {
            return Err(TicketIdError::DotSegment);
        }
        if trimmed.len() > MAX_TICKET_ID_BYTES {
            return Err(TicketIdError::TooLong);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for TicketId {
    type Error = TicketIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Ticket record
// ============================================================================

/// Lifecycle status of a ticket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Sold and not yet presented
    #[default]
    Issued,
    /// Validated at the gate
    Used,
}

impl TicketStatus {
    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Used => "used",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(Self::Issued),
            "used" => Ok(Self::Used),
            other => Err(format!("unknown ticket status '{other}'")),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who validated a ticket and when
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Operator label (email, or subject id when no email is known)
    pub validated_by: String,
    /// When the ticket was marked used
    pub validated_at: DateTime<Utc>,
}

/// A ticket as stored in the document store
///
/// The workflow only ever holds a read-only copy of this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Document key
    pub id: TicketId,
    /// Ticket holder's name
    pub holder_name: Option<String>,
    /// Ticket holder's email
    pub holder_email: Option<String>,
    /// Event name
    pub event_name: Option<String>,
    /// Event date, as recorded by the issuer
    pub event_date: Option<String>,
    /// Event location
    pub event_location: Option<String>,
    /// Holder photo reference (URL)
    pub photo_url: Option<String>,
    /// Current status
    pub status: TicketStatus,
    /// Remarks recorded at validation
    pub remarks: Option<String>,
    /// Validation metadata, present once used
    pub validation: Option<Validation>,
}

impl Ticket {
    /// A freshly issued ticket with no display fields
    #[must_use]
    pub const fn issued(id: TicketId) -> Self {
        Self {
            id,
            holder_name: None,
            holder_email: None,
            event_name: None,
            event_date: None,
            event_location: None,
            photo_url: None,
            status: TicketStatus::Issued,
            remarks: None,
            validation: None,
        }
    }

    /// Whether this ticket has already been validated
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.status == TicketStatus::Used
    }
}

// ============================================================================
// QR overlay and merged view
// ============================================================================

/// Optional display fields carried by a JSON QR payload
///
/// These are hints only. They fill gaps in the stored record for display and
/// are never written back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOverlay {
    /// Holder name hint
    pub holder_name: Option<String>,
    /// Holder email hint
    pub holder_email: Option<String>,
    /// Event name hint
    pub event_name: Option<String>,
    /// Event date hint
    pub event_date: Option<String>,
    /// Event location hint
    pub event_location: Option<String>,
    /// Photo URL hint
    pub photo_url: Option<String>,
}

impl ScanOverlay {
    /// Whether the payload carried no display fields
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.holder_name.is_none()
            && self.holder_email.is_none()
            && self.event_name.is_none()
            && self.event_date.is_none()
            && self.event_location.is_none()
            && self.photo_url.is_none()
    }
}

/// What the operator sees in review: the stored record, with QR hints
/// filling any field the store left empty
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketDetails {
    /// Ticket id
    pub id: TicketId,
    /// Holder name
    pub holder_name: Option<String>,
    /// Holder email
    pub holder_email: Option<String>,
    /// Event name
    pub event_name: Option<String>,
    /// Event date
    pub event_date: Option<String>,
    /// Event location
    pub event_location: Option<String>,
    /// Photo URL
    pub photo_url: Option<String>,
    /// Status, always from the store
    pub status: TicketStatus,
    /// Stored remarks
    pub remarks: Option<String>,
    /// Stored validation metadata
    pub validation: Option<Validation>,
}

impl TicketDetails {
    /// Merge a stored ticket with QR hints; stored values win
    #[must_use]
    pub fn merge(ticket: &Ticket, overlay: &ScanOverlay) -> Self {
        fn pick(stored: Option<&String>, hint: Option<&String>) -> Option<String> {
            stored
                .filter(|s| !s.is_empty())
                .or(hint)
                .cloned()
        }

        Self {
            id: ticket.id.clone(),
            holder_name: pick(ticket.holder_name.as_ref(), overlay.holder_name.as_ref()),
            holder_email: pick(ticket.holder_email.as_ref(), overlay.holder_email.as_ref()),
            event_name: pick(ticket.event_name.as_ref(), overlay.event_name.as_ref()),
            event_date: pick(ticket.event_date.as_ref(), overlay.event_date.as_ref()),
            event_location: pick(ticket.event_location.as_ref(), overlay.event_location.as_ref()),
            photo_url: pick(ticket.photo_url.as_ref(), overlay.photo_url.as_ref()),
            status: ticket.status,
            remarks: ticket.remarks.clone(),
            validation: ticket.validation.clone(),
        }
    }
}

impl fmt::Display for TicketDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

        writeln!(f, "Ticket:   {}", self.id)?;
        writeln!(f, "Name:     {}", show(&self.holder_name))?;
        writeln!(f, "Email:    {}", show(&self.holder_email))?;
        writeln!(f, "Event:    {}", show(&self.event_name))?;
        writeln!(f, "Date:     {}", show(&self.event_date))?;
        writeln!(f, "Location: {}", show(&self.event_location))?;
        write!(f, "Status:   {}", self.status)?;
        if let Some(validation) = &self.validation {
            write!(
                f,
                " (by {} at {})",
                validation.validated_by,
                validation.validated_at.to_rfc3339()
            )?;
        }
        if let Some(photo) = &self.photo_url {
            write!(f, "\nPhoto:    {photo}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// An authenticated operator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider subject id
    pub subject: String,
    /// Email, if the provider knows one
    pub email: Option<String>,
}

impl Identity {
    /// Label recorded as `validatedBy`: email when known, subject otherwise
    #[must_use]
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.subject)
    }
}
