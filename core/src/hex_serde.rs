// Serde adapter: byte fields as lowercase hex strings
//
// Works for `Vec<u8>` and fixed-size arrays alike.

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S, B>(bytes: &B, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    B: AsRef<[u8]> + ?Sized,
{
    serializer.serialize_str(&hex::encode(bytes.as_ref()))
}

pub fn deserialize<'de, D, B>(deserializer: D) -> Result<B, D::Error>
where
    D: Deserializer<'de>,
    B: TryFrom<Vec<u8>>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    let len = bytes.len();
    B::try_from(bytes)
        .map_err(|_| serde::de::Error::custom(format!("unexpected byte length {}", len)))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super")]
        blob: Vec<u8>,
        #[serde(with = "super")]
        digest: [u8; 4],
    }

    #[test]
    fn test_hex_fields() {
        let sample = Sample {
            blob: vec![0xde, 0xad],
            digest: [1, 2, 3, 4],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"blob":"dead","digest":"01020304"}"#);
        assert_eq!(serde_json::from_str::<Sample>(&json).unwrap(), sample);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let json = r#"{"blob":"","digest":"0102"}"#;
        assert!(serde_json::from_str::<Sample>(json).is_err());
    }

    #[test]
    fn test_bad_hex_rejected() {
        let json = r#"{"blob":"zz","digest":"01020304"}"#;
        assert!(serde_json::from_str::<Sample>(json).is_err());
    }
}
