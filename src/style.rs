//! Visibility hints read from markup.
//!
//! Without a layout engine the only style information available is what the document states
//! inline: the `hidden` attribute and declarations in the `style` attribute.

use scraper::node::Element;

/// Visibility-relevant declarations found on a single element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    /// `display: none` or the `hidden` attribute.
    pub display_none: bool,
    /// `visibility: hidden` or `visibility: collapse`.
    pub visibility_hidden: bool,
    /// `opacity: 0` (any zero spelling, including percentages).
    pub transparent: bool,
    /// `user-select: none`, vendor prefixed or not.
    pub unselectable: bool,
}

impl InlineStyle {
    /// Reads the inline hints of `element`.
    pub fn of(element: &Element) -> Self {
        let mut style = Self {
            display_none: element.attr("hidden").is_some(),
            ..Self::default()
        };
        if let Some(declarations) = element.attr("style") {
            style.apply(declarations);
        }
        style
    }

    /// Parses a `style` attribute body. Later declarations override earlier ones.
    pub fn parse(declarations: &str) -> Self {
        let mut style = Self::default();
        style.apply(declarations);
        style
    }

    /// True when the element produces no layout box.
    pub fn is_unrendered(&self) -> bool {
        self.display_none
    }

    /// True when the element renders but its text cannot be seen or selected.
    pub fn is_concealed(&self) -> bool {
        self.visibility_hidden || self.transparent || self.unselectable
    }

    fn apply(&mut self, declarations: &str) {
        for declaration in declarations.split(';') {
            let Some((property, value)) = declaration.split_once(':') else {
                continue;
            };
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim().to_ascii_lowercase();
            let value = value.trim_end_matches("!important").trim();
            match property.as_str() {
                "display" => self.display_none = value == "none",
                "visibility" => {
                    self.visibility_hidden = value == "hidden" || value == "collapse"
                }
                "opacity" => self.transparent = is_zero_opacity(value),
                "user-select" | "-webkit-user-select" | "-moz-user-select" | "-ms-user-select" => {
                    self.unselectable = value == "none"
                }
                _ => {}
            }
        }
    }
}

fn is_zero_opacity(value: &str) -> bool {
    let number = value.strip_suffix('%').unwrap_or(value).trim();
    number.parse::<f32>().map(|n| n <= 0.0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first_div(html: &str) -> InlineStyle {
        let doc = Html::parse_fragment(html);
        let selector = Selector::parse("div").unwrap();
        let element = doc.select(&selector).next().unwrap();
        InlineStyle::of(element.value())
    }

    #[test]
    fn parses_hiding_declarations() {
        let style = InlineStyle::parse("color: red; DISPLAY:none ; visibility: hidden");
        assert!(style.is_unrendered());
        assert!(style.is_concealed());
        assert!(!style.transparent);
    }

    #[test]
    fn later_declaration_wins() {
        assert!(!InlineStyle::parse("display:none;display:block").is_unrendered());
        assert!(InlineStyle::parse("opacity: 1; opacity: 0.0 !important").transparent);
    }

    #[test]
    fn important_flag_is_case_insensitive() {
        assert!(InlineStyle::parse("display:none !IMPORTANT").is_unrendered());
        assert!(InlineStyle::parse("visibility: Hidden !Important").visibility_hidden);
    }

    #[test]
    fn zero_opacity_spellings() {
        assert!(InlineStyle::parse("opacity:0").transparent);
        assert!(InlineStyle::parse("opacity:0%").transparent);
        assert!(!InlineStyle::parse("opacity:0.2").transparent);
        assert!(!InlineStyle::parse("opacity:bogus").transparent);
    }

    #[test]
    fn vendor_user_select_counts() {
        assert!(InlineStyle::parse("-webkit-user-select: none").unselectable);
    }

    #[test]
    fn hidden_attribute_removes_layout() {
        assert!(first_div("<div hidden>text</div>").is_unrendered());
        assert_eq!(first_div("<div style=\"margin:0\">text</div>"), InlineStyle::default());
    }
}
