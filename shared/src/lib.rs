use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of a successful `POST /predict`.
///
/// `all_confidences` is written as a JSON object whose keys follow the ranking
/// order (highest confidence first).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictResponse {
    pub predicted_class: String,
    pub confidence: f32,
    #[serde(with = "ranked_map")]
    pub all_confidences: Vec<(String, f32)>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserListing {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UsersResponse {
    pub users: Vec<UserListing>,
}

/// Serializes an ordered list of `(label, value)` pairs as a JSON object
/// without losing the list order.
mod ranked_map {
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(entries: &[(String, f32)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(entries.iter().map(|(label, value)| (label, value)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, f32)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RankedVisitor;

        impl<'de> Visitor<'de> for RankedVisitor {
            type Value = Vec<(String, f32)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to confidence")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, value)) = access.next_entry::<String, f32>()? {
                    entries.push((label, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(RankedVisitor)
    }
}
