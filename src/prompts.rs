//! Prompt text and response schemas sent to the generative service.

use serde_json::{json, Value};

use crate::assets::StyleVariation;
use crate::models::AdCopy;

pub const PROOFREAD_LEAD: &str = "You are a meticulous proofreader.";
pub const COPY_LEAD: &str = "You are an expert direct-response copywriter.";
pub const URL_LEAD: &str = "You are a product marketing analyst.";

/// Schema for an array of ad copy objects, all fields required.
pub fn ad_copy_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "headline": { "type": "STRING" },
                "primaryText": { "type": "STRING" },
                "cta": { "type": "STRING" }
            },
            "required": ["headline", "primaryText", "cta"]
        }
    })
}

pub fn product_from_url(url: &str) -> String {
    format!(
        "{URL_LEAD} Look at the product page at {url}. Identify the product name and write a \
        2-3 sentence description of the product that focuses on the benefits to the customer. \
        Start with the product name. Return only the description."
    )
}

pub fn proofread_text(text: &str, context: &str) -> String {
    format!(
        "{PROOFREAD_LEAD} Correct any spelling, grammar and punctuation mistakes in the text below \
        without changing its meaning, tone or length. Product context: {context}\n\n\
        Return ONLY the corrected text with no explanations and no surrounding quotes.\n\n\
        Text: {text}"
    )
}

pub fn proofread_copy(copies: &[AdCopy], context: &str) -> String {
    let payload = serde_json::to_string(copies).unwrap_or_default();
    format!(
        "{PROOFREAD_LEAD} Correct spelling, grammar and punctuation in the \"headline\" and \"primaryText\" \
        fields of each ad copy object below. Do NOT modify the \"cta\" field. Keep the same number of \
        objects in the same order. Product context: {context}\n\n\
        Return the corrected objects as a JSON array.\n\n{payload}"
    )
}

pub fn ad_copy(product_info: &str) -> String {
    format!(
        "{COPY_LEAD} Write 3 distinct ad copy variants for the product below. Each variant needs a short \
        headline, primary text of 2-3 sentences, and a short imperative call to action (cta).\n\
        Rules: no shocking or exaggerated claims, no before/after comparisons, no clickbait phrasing, \
        and always finish with a clear call to action.\n\n\
        Product: {product_info}"
    )
}

fn hook_overlay(hook_text: Option<&str>, font_style: Option<&str>) -> String {
    match hook_text {
        Some(hook) => {
            let font = font_style.map(|f| format!(" in a {f} font")).unwrap_or_default();
            format!(" Overlay the text \"{hook}\"{font}, clearly legible and well placed.")
        }
        None => " Do not add any text to the image.".to_string(),
    }
}

pub fn image_edit(variation: &StyleVariation, product_info: &str, hook_text: Option<&str>, font_style: Option<&str>) -> String {
    format!(
        "Create an advertising image from this product photo. Keep the product itself exactly as it is: \
        same shape, colors, label and proportions. Restyle the scene as a {}: {}. Product: {}.{}",
        variation.name,
        variation.direction,
        product_info,
        hook_overlay(hook_text, font_style)
    )
}

pub fn image_generate(variation: &StyleVariation, product_info: &str, hook_text: Option<&str>, font_style: Option<&str>) -> String {
    format!(
        "A high-quality advertising photograph for social media. Style: {}, {}. Product: {}.{}",
        variation.name,
        variation.direction,
        product_info,
        hook_overlay(hook_text, font_style)
    )
}

pub fn video(product_info: &str, with_image: bool, hook_text: Option<&str>, font_style: Option<&str>) -> String {
    let subject = if with_image {
        "Animate the product from the provided image, keeping its appearance unchanged."
    } else {
        "Show the product in attractive, realistic settings."
    };
    let overlay = match hook_text {
        Some(hook) => {
            let font = font_style.map(|f| format!(" in a {f} font")).unwrap_or_default();
            format!(" Display the text overlay \"{hook}\"{font} during the opening.")
        }
        None => String::new(),
    };
    format!(
        "An 8-15 second seamlessly looping video ad. {subject} Grab attention with a strong visual hook \
        within the first 2 seconds, then highlight the key benefit. Product: {product_info}.{overlay}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::STYLE_VARIATIONS;

    #[test]
    fn copy_prompt_carries_policy_rules() {
        let p = ad_copy("Reusable coffee cup");
        assert!(p.starts_with(COPY_LEAD));
        assert!(p.contains("3 distinct"));
        assert!(p.contains("no before/after"));
        assert!(p.contains("Reusable coffee cup"));
    }

    #[test]
    fn hook_text_is_overlaid_with_font() {
        let p = image_generate(&STYLE_VARIATIONS[0], "Cup", Some("Sip sustainably"), Some("bold sans-serif"));
        assert!(p.contains("\"Sip sustainably\" in a bold sans-serif font"));
        let p = image_generate(&STYLE_VARIATIONS[0], "Cup", None, Some("bold"));
        assert!(p.contains("Do not add any text"));
    }

    #[test]
    fn copy_proofread_prompt_embeds_json_and_protects_cta() {
        let copies = vec![AdCopy { headline: "Hedline".into(), primary_text: "Txt".into(), cta: "Buy".into() }];
        let p = proofread_copy(&copies, "Cup");
        assert!(p.contains(r#""primaryText":"Txt""#));
        assert!(p.contains("Do NOT modify the \"cta\""));
    }

    #[test]
    fn video_prompt_mentions_hook_window() {
        let p = video("Cup", true, None, None);
        assert!(p.contains("first 2 seconds"));
        assert!(p.contains("provided image"));
    }
}
