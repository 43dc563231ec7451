//! HERT: compact, lossless reference to a single entity mention.
//!
//! Packed byte layout, fixed-order fields, length-prefixed where variable:
//!
//! ```text
//! [did u64 be][eid 6 bytes be][flags u8]
//! [aid 3 bytes be]?            when flags bit 0
//! [len u8][sense u16 be]...    when flags bit 1
//! [paragraph u32 be][token_start u32 be][token_len u16 be][lp_hash 3 bytes be]
//! ```
//!
//! The readable form is `eid:aid?:sp?:did:paragraph:token_start:token_length`
//! with empty segments for absent optionals and dot-separated sense values.

use super::{Aid, Did, Eid, IdentityError, LpHash};

const FLAG_AID: u8 = 0b0000_0001;
const FLAG_SENSE: u8 = 0b0000_0010;

/// Stable position of a mention inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub paragraph: u32,
    pub token_start: u32,
    pub token_len: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hert {
    pub did: Did,
    pub eid: Eid,
    pub aid: Option<Aid>,
    pub sense_path: Option<Vec<u16>>,
    pub location: Location,
    pub lp_hash: LpHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HertError {
    Truncated { wanted: usize, available: usize },
    TrailingBytes { count: usize },
    Width(IdentityError),
    BadText(String),
}

impl std::fmt::Display for HertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HertError::Truncated { wanted, available } => {
                write!(f, "truncated: wanted {} bytes, had {}", wanted, available)
            }
            HertError::TrailingBytes { count } => {
                write!(f, "{} trailing bytes after record", count)
            }
            HertError::Width(e) => write!(f, "{}", e),
            HertError::BadText(s) => write!(f, "unparseable text form: {}", s),
        }
    }
}

impl std::error::Error for HertError {}

impl From<IdentityError> for HertError {
    fn from(e: IdentityError) -> Self {
        HertError::Width(e)
    }
}

/// Cheap position hash (FNV-1a over the location fields, masked to 20 bits)
/// used to detect that a document revision shifted a mention.
pub fn lp_hash(location: &Location) -> LpHash {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET;
    let mut mix = |value: u32| {
        for byte in value.to_le_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(PRIME);
        }
    };
    mix(location.paragraph);
    mix(location.token_start);
    mix(location.token_len as u32);
    LpHash::new(hash & LpHash::MAX).expect("masked to 20 bits")
}

impl Hert {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&self.did.value().to_be_bytes());
        out.extend_from_slice(&self.eid.value().to_be_bytes()[2..8]);

        let mut flags = 0u8;
        if self.aid.is_some() {
            flags |= FLAG_AID;
        }
        if self.sense_path.is_some() {
            flags |= FLAG_SENSE;
        }
        out.push(flags);

        if let Some(aid) = self.aid {
            out.extend_from_slice(&aid.value().to_be_bytes()[1..4]);
        }
        if let Some(sense) = &self.sense_path {
            out.push(sense.len() as u8);
            for value in sense {
                out.extend_from_slice(&value.to_be_bytes());
            }
        }

        out.extend_from_slice(&self.location.paragraph.to_be_bytes());
        out.extend_from_slice(&self.location.token_start.to_be_bytes());
        out.extend_from_slice(&self.location.token_len.to_be_bytes());
        out.extend_from_slice(&self.lp_hash.value().to_be_bytes()[1..4]);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Hert, HertError> {
        let mut reader = Reader { bytes, pos: 0 };

        let did = Did::from_raw(u64::from_be_bytes(reader.take::<8>()?));
        let eid_bytes = reader.take::<6>()?;
        let mut eid_raw = [0u8; 8];
        eid_raw[2..8].copy_from_slice(&eid_bytes);
        let eid = Eid::new(u64::from_be_bytes(eid_raw))?;

        let flags = reader.take::<1>()?[0];

        let aid = if flags & FLAG_AID != 0 {
            let aid_bytes = reader.take::<3>()?;
            let mut aid_raw = [0u8; 4];
            aid_raw[1..4].copy_from_slice(&aid_bytes);
            Some(Aid::new(u32::from_be_bytes(aid_raw))?)
        } else {
            None
        };

        let sense_path = if flags & FLAG_SENSE != 0 {
            let len = reader.take::<1>()?[0] as usize;
            let mut values = Vec::with_capacity(len);
            for _ in 0..len {
                values.push(u16::from_be_bytes(reader.take::<2>()?));
            }
            Some(values)
        } else {
            None
        };

        let paragraph = u32::from_be_bytes(reader.take::<4>()?);
        let token_start = u32::from_be_bytes(reader.take::<4>()?);
        let token_len = u16::from_be_bytes(reader.take::<2>()?);
        let hash_bytes = reader.take::<3>()?;
        let mut hash_raw = [0u8; 4];
        hash_raw[1..4].copy_from_slice(&hash_bytes);
        let lp = LpHash::new(u32::from_be_bytes(hash_raw))?;

        if reader.pos != bytes.len() {
            return Err(HertError::TrailingBytes {
                count: bytes.len() - reader.pos,
            });
        }

        Ok(Hert {
            did,
            eid,
            aid,
            sense_path,
            location: Location {
                paragraph,
                token_start,
                token_len,
            },
            lp_hash: lp,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], HertError> {
        if self.pos + N > self.bytes.len() {
            return Err(HertError::Truncated {
                wanted: N,
                available: self.bytes.len() - self.pos,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }
}

impl std::fmt::Display for Hert {
    /// `eid:aid?:sp?:did:paragraph:token_start:token_length`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.eid)?;
        if let Some(aid) = self.aid {
            write!(f, "{}", aid)?;
        }
        write!(f, ":")?;
        if let Some(sense) = &self.sense_path {
            let parts: Vec<String> = sense.iter().map(|v| v.to_string()).collect();
            write!(f, "{}", parts.join("."))?;
        }
        write!(
            f,
            ":{}:{}:{}:{}",
            self.did, self.location.paragraph, self.location.token_start, self.location.token_len
        )
    }
}

impl std::str::FromStr for Hert {
    type Err = HertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 7 {
            return Err(HertError::BadText(format!(
                "expected 7 segments, found {}",
                parts.len()
            )));
        }
        fn field<T: std::str::FromStr>(p: &str) -> Result<T, HertError>
        where
            T::Err: std::fmt::Display,
        {
            p.parse::<T>()
                .map_err(|e| HertError::BadText(format!("'{}': {}", p, e)))
        }

        let eid = Eid::new(field::<u64>(parts[0])?)?;
        let aid = if parts[1].is_empty() {
            None
        } else {
            Some(Aid::new(field::<u32>(parts[1])?)?)
        };
        let sense_path = if parts[2].is_empty() {
            None
        } else {
            let values: Result<Vec<u16>, _> =
                parts[2].split('.').map(field::<u16>).collect();
            Some(values?)
        };
        let did = Did::from_raw(field::<u64>(parts[3])?);
        let location = Location {
            paragraph: field::<u32>(parts[4])?,
            token_start: field::<u32>(parts[5])?,
            token_len: field::<u16>(parts[6])?,
        };

        Ok(Hert {
            did,
            eid,
            aid,
            sense_path,
            lp_hash: lp_hash(&location),
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(aid: Option<u32>, sense: Option<Vec<u16>>) -> Hert {
        let location = Location {
            paragraph: 3,
            token_start: 17,
            token_len: 2,
        };
        Hert {
            did: Did::derive("doc://sample", b"body", 1),
            eid: Eid::new(42).unwrap(),
            aid: aid.map(|v| Aid::new(v).unwrap()),
            sense_path: sense,
            lp_hash: lp_hash(&location),
            location,
        }
    }

    #[test]
    fn round_trips_with_all_fields() {
        let hert = sample(Some(9001), Some(vec![1, 3]));
        let decoded = Hert::decode(&hert.encode()).unwrap();
        assert_eq!(decoded, hert);
    }

    #[test]
    fn round_trips_without_optionals() {
        let hert = sample(None, None);
        let bytes = hert.encode();
        let decoded = Hert::decode(&bytes).unwrap();
        assert_eq!(decoded, hert);
        // Optional fields absent: fixed layout only.
        assert_eq!(bytes.len(), 8 + 6 + 1 + 4 + 4 + 2 + 3);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = sample(None, None).encode();
        let err = Hert::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, HertError::Truncated { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = sample(None, None).encode();
        bytes.push(0);
        assert_eq!(
            Hert::decode(&bytes).unwrap_err(),
            HertError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn text_form_round_trips() {
        let hert = sample(Some(7), Some(vec![2]));
        let text = hert.to_string();
        let parsed: Hert = text.parse().unwrap();
        assert_eq!(parsed, hert);
    }

    #[test]
    fn text_form_with_empty_optionals_round_trips() {
        let hert = sample(None, None);
        let text = hert.to_string();
        assert_eq!(text.matches(':').count(), 6);
        let parsed: Hert = text.parse().unwrap();
        assert_eq!(parsed, hert);
    }

    #[test]
    fn lp_hash_fits_twenty_bits_and_tracks_position() {
        let a = lp_hash(&Location {
            paragraph: 0,
            token_start: 5,
            token_len: 1,
        });
        let b = lp_hash(&Location {
            paragraph: 0,
            token_start: 6,
            token_len: 1,
        });
        assert!(a.value() <= LpHash::MAX);
        assert_ne!(a, b);
    }
}
