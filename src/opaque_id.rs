use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decoded form of an opaque identifier: `namespace:id`.
///
/// `id` is `None` when the decoded text has no `:` separator. Callers must
/// treat that as an unresolvable identifier rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueId {
    pub namespace: String,
    pub id: Option<String>,
}

impl OpaqueId {
    /// The id, if present and non-empty.
    #[must_use]
    pub fn resolved_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Decodes an opaque identifier.
///
/// Returns `None` only when no identifier was supplied. Any supplied string
/// decodes to *something*: invalid base64 gives an empty namespace and no id,
/// invalid UTF-8 is replaced lossily.
#[must_use]
pub fn decode_opaque_id(opaque_id: Option<&str>) -> Option<OpaqueId> {
    let opaque_id = opaque_id?;

    let bytes = STANDARD_LENIENT
        .decode(opaque_id)
        .or_else(|_| URL_SAFE_LENIENT.decode(opaque_id))
        .unwrap_or_default();
    let text = String::from_utf8_lossy(&bytes);

    let decoded = match text.split_once(':') {
        Some((namespace, id)) => OpaqueId {
            namespace: namespace.to_owned(),
            id: Some(id.to_owned()),
        },
        None => OpaqueId {
            namespace: text.into_owned(),
            id: None,
        },
    };
    Some(decoded)
}

/// Encodes `namespace:id` as standard base64.
#[must_use]
pub fn encode_opaque_id(namespace: &str, id: &str) -> String {
    STANDARD.encode(format!("{namespace}:{id}"))
}
