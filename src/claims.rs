// src/claims.rs

use serde::{Deserialize, Deserializer, Serialize};

/// The identity of the logged-in user, taken from a verified ID Token.
///
/// Deserialized from the token's `sub`, `name`, `aud` and `email` claims and
/// serialized as the callback's JSON body. `access_token` and `id_token` are
/// attached after verification; they never come from the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename(serialize = "subject", deserialize = "sub"))]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        rename(serialize = "audience", deserialize = "aud"),
        deserialize_with = "one_or_many"
    )]
    pub audience: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_deserializing)]
    pub access_token: String,
    #[serde(default, skip_deserializing)]
    pub id_token: String,
}

/// `aud` is either a single string or an array of strings (OIDC Core §2).
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(aud) => vec![aud],
        Audience::Many(auds) => auds,
    })
}
