use schemars::JsonSchema;
use serde::Deserialize;

use crate::types::EnhancementOptions;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnhanceRequest {
    /// The text to improve. Trimmed; must be non-empty and at most 10,000 characters.
    pub text: String,
    /// Rewrite style: "grammar", "rephrase" (default), "formal", "casual", "concise", "expand".
    /// Unknown values are treated as "rephrase".
    pub enhancement_type: Option<String>,
    /// Target language for the output, e.g. "German". Defaults to the input's language.
    pub language: Option<String>,
    /// Extra context about where the text will be used (e.g. "email to a customer").
    pub context: Option<String>,
    /// Number of alternative suggestions to ask for (1-3, default 2). Some providers return one.
    pub max_variants: Option<u8>,
}

impl EnhanceRequest {
    pub fn options(&self) -> EnhancementOptions {
        options_from(
            self.enhancement_type.as_deref(),
            self.language.as_deref(),
            self.context.as_deref(),
            self.max_variants,
        )
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CaptureRequest {
    /// Rewrite style, as for `enhance`.
    pub enhancement_type: Option<String>,
    /// Target language for the output.
    pub language: Option<String>,
    /// Extra context about where the text will be used.
    pub context: Option<String>,
    /// Number of alternative suggestions (1-3, default 2).
    pub max_variants: Option<u8>,
}

impl CaptureRequest {
    pub fn options(&self) -> EnhancementOptions {
        options_from(
            self.enhancement_type.as_deref(),
            self.language.as_deref(),
            self.context.as_deref(),
            self.max_variants,
        )
    }
}

pub(crate) fn options_from(
    kind: Option<&str>,
    language: Option<&str>,
    context: Option<&str>,
    max_variants: Option<u8>,
) -> EnhancementOptions {
    let non_empty = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    EnhancementOptions {
        kind: non_empty(kind).map(Into::into).unwrap_or_default(),
        language: non_empty(language),
        context: non_empty(context),
        max_variants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnhancementType;

    #[test]
    fn blank_fields_fall_back_to_defaults() {
        let req: EnhanceRequest = serde_json::from_str(
            r#"{"text":"hi","enhancement_type":"  ","language":""}"#,
        )
        .unwrap();
        let opts = req.options();
        assert_eq!(opts.kind, EnhancementType::Rephrase);
        assert!(opts.language.is_none());
        assert_eq!(opts.variants(), 2);
    }

    #[test]
    fn known_type_is_parsed() {
        let req: EnhanceRequest =
            serde_json::from_str(r#"{"text":"hi","enhancement_type":"Formal","max_variants":9}"#)
                .unwrap();
        let opts = req.options();
        assert_eq!(opts.kind, EnhancementType::Formal);
        assert_eq!(opts.variants(), 3);
    }
}
