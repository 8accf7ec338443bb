//! Synthetic machine-identity generation.
//!
//! All randomness comes from the caller-supplied source so a seeded source
//! reproduces the same record.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::domain::version::DeviceModel;
use crate::domain::{EngineError, Result};

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Bytes at or above this value are rejected so every symbol is equally likely.
const REJECT_AT: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

pub const PRIMARY_SERIAL_LEN: usize = 12;
pub const BOARD_SERIAL_LEN: usize = 12;
pub const SECONDARY_SERIAL_LEN: usize = 20;
pub const UUID_GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

/// Identity tokens for one device model. All four tokens are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub model: DeviceModel,
    pub primary_serial: String,
    pub uuid: String,
    pub board_serial: String,
    pub secondary_serial: String,
}

impl IdentityRecord {
    /// Assemble a record from caller-provided tokens, validating each one.
    pub fn from_parts(
        model: DeviceModel,
        primary_serial: impl Into<String>,
        uuid: impl Into<String>,
        board_serial: impl Into<String>,
        secondary_serial: impl Into<String>,
    ) -> Result<Self> {
        let record = Self {
            model,
            primary_serial: primary_serial.into(),
            uuid: uuid.into(),
            board_serial: board_serial.into(),
            secondary_serial: secondary_serial.into(),
        };
        record.validate()?;
        Ok(record)
    }

    /// Check lengths, alphabet, and uuid grouping.
    pub fn validate(&self) -> Result<()> {
        check_token("primary_serial", &self.primary_serial, PRIMARY_SERIAL_LEN)?;
        check_token("board_serial", &self.board_serial, BOARD_SERIAL_LEN)?;
        check_token("secondary_serial", &self.secondary_serial, SECONDARY_SERIAL_LEN)?;

        let groups: Vec<&str> = self.uuid.split('-').collect();
        if groups.len() != UUID_GROUPS.len() {
            return Err(EngineError::InvalidIdentity {
                field: "uuid",
                reason: format!("expected {} groups, got {}", UUID_GROUPS.len(), groups.len()),
            });
        }
        for (group, len) in groups.iter().zip(UUID_GROUPS) {
            check_token("uuid", group, len)?;
        }
        Ok(())
    }
}

fn check_token(field: &'static str, token: &str, len: usize) -> Result<()> {
    if token.len() != len {
        return Err(EngineError::InvalidIdentity {
            field,
            reason: format!("expected {len} characters, got {}", token.len()),
        });
    }
    if let Some(c) = token.chars().find(|c| !ALPHABET.contains(&(*c as u8)) || !c.is_ascii()) {
        return Err(EngineError::InvalidIdentity {
            field,
            reason: format!("character '{c}' is not uppercase alphanumeric"),
        });
    }
    Ok(())
}

/// Draws uppercase alphanumeric symbols from a byte source.
struct TokenDrawer<'a> {
    rng: &'a mut dyn RngCore,
    buf: [u8; 32],
    pos: usize,
}

impl<'a> TokenDrawer<'a> {
    fn new(rng: &'a mut dyn RngCore) -> Self {
        Self {
            rng,
            buf: [0; 32],
            pos: 32,
        }
    }

    fn symbol(&mut self) -> Result<char> {
        loop {
            if self.pos == self.buf.len() {
                self.rng
                    .try_fill_bytes(&mut self.buf)
                    .map_err(|e| EngineError::RandomSource(e.to_string()))?;
                self.pos = 0;
            }
            let b = self.buf[self.pos];
            self.pos += 1;
            if b < REJECT_AT {
                return Ok(ALPHABET[(b as usize) % ALPHABET.len()] as char);
            }
        }
    }

    fn token(&mut self, len: usize) -> Result<String> {
        (0..len).map(|_| self.symbol()).collect()
    }
}

/// Generate a fresh identity for `model` using only `rng`.
///
/// Fails only with [`EngineError::RandomSource`] when `rng` fails; no partial
/// record is ever returned.
pub fn synthesize(model: DeviceModel, rng: &mut dyn RngCore) -> Result<IdentityRecord> {
    let mut draw = TokenDrawer::new(rng);

    let primary_serial = draw.token(PRIMARY_SERIAL_LEN)?;
    let uuid = UUID_GROUPS
        .iter()
        .map(|len| draw.token(*len))
        .collect::<Result<Vec<_>>>()?
        .join("-");
    let board_serial = draw.token(BOARD_SERIAL_LEN)?;
    let secondary_serial = draw.token(SECONDARY_SERIAL_LEN)?;

    tracing::debug!(model = %model, "identity synthesized");
    Ok(IdentityRecord {
        model,
        primary_serial,
        uuid,
        board_serial,
        secondary_serial,
    })
}
