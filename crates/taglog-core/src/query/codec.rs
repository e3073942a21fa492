//! Versioned JSON encoding of [`Query`].
//!
//! Storage adapters persist query intent (for audit and debugging) in this
//! shape:
//!
//! ```text
//! {"version":"1.0","criteria":[{"type":"EventTypesAndTags","hash":"<blake3>","properties":{...}}]}
//! ```
//!
//! `properties` omits absent fields. The wildcard query has an empty
//! `criteria` array. Decoding rejects other versions, unknown criterion
//! types, and hashes that do not match the decoded properties.

use serde::{Deserialize, Serialize};

use super::criterion::{Criterion, CriterionProperties};
use super::{Criteria, Query};
use crate::error::SerializationError;

/// Current query format version.
pub const QUERY_FORMAT_VERSION: &str = "1.0";

/// The only criterion type this format knows.
pub const EVENT_TYPES_AND_TAGS: &str = "EventTypesAndTags";

#[derive(Debug, Serialize, Deserialize)]
struct QueryWire {
    version: String,
    criteria: Vec<CriterionWire>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CriterionWire {
    #[serde(rename = "type")]
    kind: String,
    hash: String,
    properties: serde_json::Value,
}

fn encode(query: &Query) -> Result<QueryWire, SerializationError> {
    let criteria = match query {
        Query::All => Vec::new(),
        Query::Matching(criteria) => criteria
            .iter()
            .map(|c| -> Result<CriterionWire, SerializationError> {
                Ok(CriterionWire {
                    kind: EVENT_TYPES_AND_TAGS.to_string(),
                    hash: c.hash().to_string(),
                    properties: serde_json::to_value(c.properties())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(QueryWire {
        version: QUERY_FORMAT_VERSION.to_string(),
        criteria,
    })
}

fn decode(wire: QueryWire) -> Result<Query, SerializationError> {
    if wire.version != QUERY_FORMAT_VERSION {
        return Err(SerializationError::UnsupportedVersion {
            found: wire.version,
            expected: QUERY_FORMAT_VERSION,
        });
    }

    let mut criteria = Vec::with_capacity(wire.criteria.len());
    for item in wire.criteria {
        if item.kind != EVENT_TYPES_AND_TAGS {
            return Err(SerializationError::UnknownCriterionType(item.kind));
        }
        let properties: CriterionProperties = serde_json::from_value(item.properties)?;
        let criterion = Criterion::from_properties(properties)?;
        if criterion.hash() != item.hash {
            return Err(SerializationError::HashMismatch {
                declared: item.hash,
                computed: criterion.hash().to_string(),
            });
        }
        criteria.push(criterion);
    }

    Ok(Criteria::new(criteria).map_or(Query::All, Query::Matching))
}

impl Query {
    /// Encode as versioned JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Json`] if encoding fails.
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(&encode(self)?)?)
    }

    /// Decode versioned JSON produced by [`Query::to_json`].
    ///
    /// # Errors
    ///
    /// - [`SerializationError::Json`] for malformed JSON or property shapes.
    /// - [`SerializationError::UnsupportedVersion`] for another format version.
    /// - [`SerializationError::UnknownCriterionType`] for unknown criteria.
    /// - [`SerializationError::HashMismatch`] when a hash was tampered with.
    /// - [`SerializationError::Invalid`] when a criterion fails validation.
    pub fn from_json(json: &str) -> Result<Self, SerializationError> {
        decode(serde_json::from_str(json)?)
    }
}

impl Serialize for Query {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = QueryWire::deserialize(deserializer)?;
        decode(wire).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTypes;
    use crate::tag::Tags;
    use serde_json::{Value, json};

    fn sample() -> Query {
        Query::from_criteria(vec![
            Criterion::of_types(EventTypes::try_from_strings(["CourseDefined"]).expect("types"))
                .expect("criterion"),
            Criterion::new(
                Some(EventTypes::try_from_strings(["StudentSubscribed"]).expect("types")),
                Some(Tags::try_from_strings(["course:c1"]).expect("tags")),
                false,
            )
            .expect("criterion")
            .only_last_event(),
        ])
    }

    #[test]
    fn encodes_versioned_shape() {
        let json: Value = serde_json::from_str(&sample().to_json().expect("encode")).expect("json");
        assert_eq!(json["version"], "1.0");
        let first = &json["criteria"][0];
        assert_eq!(first["type"], "EventTypesAndTags");
        assert_eq!(first["hash"].as_str().map(str::len), Some(64));
        assert_eq!(
            first["properties"],
            json!({"eventTypes": ["CourseDefined"], "onlyLastEvent": false})
        );
        assert_eq!(
            json["criteria"][1]["properties"],
            json!({"eventTypes": ["StudentSubscribed"], "tags": ["course:c1"], "onlyLastEvent": true})
        );
    }

    #[test]
    fn roundtrip_preserves_query() {
        let q = sample();
        let back = Query::from_json(&q.to_json().expect("encode")).expect("decode");
        assert_eq!(back, q);
    }

    #[test]
    fn wildcard_has_empty_criteria() {
        let json = Query::all().to_json().expect("encode");
        assert_eq!(json, r#"{"version":"1.0","criteria":[]}"#);
        assert_eq!(Query::from_json(&json).expect("decode"), Query::All);
    }

    #[test]
    fn rejects_other_version() {
        let err = Query::from_json(r#"{"version":"2.0","criteria":[]}"#).unwrap_err();
        assert!(matches!(err, SerializationError::UnsupportedVersion { ref found, .. } if found == "2.0"));
    }

    #[test]
    fn rejects_unknown_criterion_type() {
        let err = Query::from_json(
            r#"{"version":"1.0","criteria":[{"type":"Geo","hash":"x","properties":{}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SerializationError::UnknownCriterionType(ref t) if t == "Geo"));
    }

    #[test]
    fn rejects_tampered_hash() {
        let mut json: Value =
            serde_json::from_str(&sample().to_json().expect("encode")).expect("json");
        json["criteria"][0]["properties"]["eventTypes"] = json!(["Other"]);
        let err = Query::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, SerializationError::HashMismatch { .. }));
    }

    #[test]
    fn rejects_empty_properties() {
        let err = Query::from_json(
            r#"{"version":"1.0","criteria":[{"type":"EventTypesAndTags","hash":"x","properties":{}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SerializationError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Query::from_json("{not json"),
            Err(SerializationError::Json(_))
        ));
        assert!(matches!(
            Query::from_json(r#"{"version":"1.0"}"#),
            Err(SerializationError::Json(_))
        ));
    }

    #[test]
    fn serde_impls_use_the_same_format() {
        let q = sample();
        let via_serde = serde_json::to_string(&q).expect("serialize");
        assert_eq!(via_serde, q.to_json().expect("encode"));
        let back: Query = serde_json::from_str(&via_serde).expect("deserialize");
        assert_eq!(back, q);
    }
}
