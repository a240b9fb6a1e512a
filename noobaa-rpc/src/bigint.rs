use serde::{Deserialize, Deserializer, Serialize, Serializer};

const PETA: u64 = 1 << 50;
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// Integer that may exceed what a JSON double can carry exactly.
///
/// Serialized as a plain number while `peta` is zero and as `{"n", "peta"}`
/// otherwise, where the value is `peta * 2^50 + n`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BigInt {
    pub n: i64,
    pub peta: i64,
}

#[derive(Serialize, Deserialize)]
struct BigIntObject {
    n: i64,
    #[serde(default)]
    peta: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BigIntRepr {
    Plain(i64),
    Float(f64),
    Object(BigIntObject),
}

impl BigInt {
    pub fn new(n: i64, peta: i64) -> BigInt {
        BigInt { n, peta }
    }

    pub fn from_u64(value: u64) -> BigInt {
        if value < MAX_SAFE_INTEGER {
            return BigInt {
                n: value as i64,
                peta: 0,
            };
        }
        BigInt {
            n: (value % PETA) as i64,
            peta: (value / PETA) as i64,
        }
    }

    /// Folds the pair back into a single value, saturating at the u64 bounds.
    pub fn to_u64(&self) -> u64 {
        let peta = u64::try_from(self.peta).unwrap_or(0);
        let n = u64::try_from(self.n).unwrap_or(0);
        peta.saturating_mul(PETA).saturating_add(n)
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        BigInt::from_u64(value)
    }
}

impl Serialize for BigInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.peta == 0 {
            serializer.serialize_i64(self.n)
        } else {
            BigIntObject {
                n: self.n,
                peta: self.peta,
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match BigIntRepr::deserialize(deserializer)? {
            BigIntRepr::Plain(n) => BigInt { n, peta: 0 },
            // the server occasionally sends sizes as doubles
            BigIntRepr::Float(f) => BigInt::from_u64(f.max(0.0) as u64),
            BigIntRepr::Object(BigIntObject { n, peta }) => BigInt { n, peta },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal() {
        assert_eq!(
            serde_json::to_string(&BigInt::new(666, 1)).unwrap(),
            r#"{"n":666,"peta":1}"#
        );
        assert_eq!(serde_json::to_string(&BigInt::new(11, 0)).unwrap(), "11");
    }

    #[test]
    fn test_unmarshal() {
        let parsed: BigInt = serde_json::from_str(r#"{"n":99}"#).unwrap();
        assert_eq!(parsed, BigInt::new(99, 0));

        let parsed: BigInt = serde_json::from_str("12345").unwrap();
        assert_eq!(parsed, BigInt::new(12345, 0));

        let parsed: BigInt = serde_json::from_str(r#"{"n":5,"peta":3}"#).unwrap();
        assert_eq!(parsed, BigInt::new(5, 3));

        let parsed: BigInt = serde_json::from_str("1024.0").unwrap();
        assert_eq!(parsed, BigInt::new(1024, 0));
    }

    #[test]
    fn test_round_trip_across_the_range() {
        for value in [
            0u64,
            1,
            MAX_SAFE_INTEGER - 1,
            MAX_SAFE_INTEGER,
            MAX_SAFE_INTEGER + 7,
            PETA * 1000 + 42,
            (1u64 << 63) - 1,
        ] {
            let big = BigInt::from_u64(value);
            let json = serde_json::to_string(&big).unwrap();
            let parsed: BigInt = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.to_u64(), value, "value {value} via {json}");
        }
    }

    #[test]
    fn test_large_values_split_on_peta() {
        let big = BigInt::from_u64(MAX_SAFE_INTEGER);
        assert_eq!(big, BigInt::new(0, 8));
        assert_eq!(
            serde_json::to_value(big).unwrap(),
            serde_json::json!({"n": 0, "peta": 8})
        );
    }
}
