//! Relay wire protocol
//!
//! One text message per frame. Three kinds exist:
//!
//! ```text
//! keepalive      ping
//! announcement   stockings:repo <sig> <sig> ...
//! update         <name>\n@@@\n<version>\n@@@\n<PEM>\n@@@\n<sig base64>\n@@@\n<content base64>
//! ```
//!
//! The announcement lists the signature of every archive the sender holds.
//! An update carries one complete archive tuple.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::archive::{Archive, ArchiveName, Version};
use crate::error::StockingsError;
use crate::identity::{PublisherKey, Signature};

/// Separator between the fields of an update frame
pub const DELIMITER: &str = "\n@@@\n";

/// First word of an announcement frame
pub const ANNOUNCE_PREFIX: &str = "stockings:repo";

/// Keepalive frame body
pub const KEEPALIVE: &str = "ping";

const UPDATE_FIELDS: usize = 5;

/// A decoded relay message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Keepalive,
    /// Signatures of all archives held by the sender
    Announce(Vec<Signature>),
    Update(Archive),
}

impl Frame {
    /// Announcement listing the given signatures
    pub fn announce<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> Self {
        Frame::Announce(signatures.into_iter().cloned().collect())
    }

    pub fn encode(&self) -> String {
        match self {
            Frame::Keepalive => KEEPALIVE.to_string(),
            Frame::Announce(signatures) => {
                let mut text = String::from(ANNOUNCE_PREFIX);
                text.push(' ');
                let joined: Vec<&str> = signatures.iter().map(Signature::as_base64).collect();
                text.push_str(&joined.join(" "));
                text
            }
            Frame::Update(archive) => [
                archive.name.as_str(),
                archive.version.as_str(),
                archive.publisher_key.as_pem(),
                archive.signature.as_base64(),
                &STANDARD.encode(&archive.content),
            ]
            .join(DELIMITER),
        }
    }

    pub fn decode(text: &str) -> Result<Self, StockingsError> {
        if text == KEEPALIVE {
            return Ok(Frame::Keepalive);
        }

        if let Some(rest) = text.strip_prefix(ANNOUNCE_PREFIX) {
            if rest.is_empty() || rest.starts_with(' ') {
                return Ok(Frame::Announce(
                    rest.split(' ')
                        .filter(|sig| !sig.is_empty())
                        .map(Signature::from_base64)
                        .collect(),
                ));
            }
        }

        let fields: Vec<&str> = text.split(DELIMITER).collect();
        if fields.len() != UPDATE_FIELDS {
            return Err(StockingsError::MalformedMessage(format!(
                "expected {} update fields, got {}",
                UPDATE_FIELDS,
                fields.len()
            )));
        }

        let name = ArchiveName::new(fields[0])
            .map_err(|e| StockingsError::MalformedMessage(e.to_string()))?;
        let version = Version::new(fields[1])
            .map_err(|e| StockingsError::MalformedMessage(e.to_string()))?;
        let content = STANDARD.decode(fields[4].trim()).map_err(|e| {
            StockingsError::MalformedMessage(format!("invalid content encoding: {}", e))
        })?;

        Ok(Frame::Update(Archive {
            name,
            version,
            publisher_key: PublisherKey::from_pem(fields[2]),
            signature: Signature::from_base64(fields[3]),
            content,
        }))
    }
}
