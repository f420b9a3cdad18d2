//! Markup-extension grammar.
//!
//! ```text
//! extension := '{' name (ws args)? '}'
//! args      := arg (',' arg)*
//! arg       := member '=' value | value
//! value     := extension | quoted | text
//! ```
//!
//! Text runs end at a top-level `,` or `}`; braces inside a text run must
//! balance. `\` escapes the next character and `'`/`"` quote a run verbatim.
//! A value starting with `{}` is an escaped literal, not an extension.

/// Keywords whose first argument names another resource.
pub const REFERENCE_KEYWORDS: &[&str] = &["StaticResource", "DynamicResource", "ThemeResource"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupValue {
    Text(String),
    Extension(MarkupExtension),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupExtension {
    /// Extension name as written, possibly prefixed (`x:Static`)
    pub name: String,
    pub positional: Vec<MarkupValue>,
    pub named: Vec<(String, MarkupValue)>,
}

impl MarkupExtension {
    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn named_argument(&self, member: &str) -> Option<&MarkupValue> {
        self.named.iter().find(|(n, _)| n == member).map(|(_, v)| v)
    }

    pub fn is_resource_reference(&self) -> bool {
        REFERENCE_KEYWORDS.contains(&self.local_name())
    }

    /// The referenced key when this is a resource reference with a literal key.
    pub fn referenced_key(&self) -> Option<&str> {
        if !self.is_resource_reference() {
            return None;
        }
        let value = self
            .named_argument("ResourceKey")
            .or_else(|| self.positional.first())?;
        match value {
            MarkupValue::Text(key) if !key.is_empty() => Some(key.as_str()),
            _ => None,
        }
    }

    /// Every literal resource key referenced by this extension or any nested
    /// one, outermost first.
    pub fn resource_references(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_references(&mut keys);
        keys
    }

    fn collect_references(&self, keys: &mut Vec<String>) {
        if let Some(key) = self.referenced_key() {
            keys.push(key.to_string());
        }
        let nested = self
            .positional
            .iter()
            .chain(self.named.iter().map(|(_, v)| v));
        for value in nested {
            if let MarkupValue::Extension(ext) = value {
                ext.collect_references(keys);
            }
        }
    }
}

/// Parses an attribute value as a markup extension. Returns `None` for plain
/// values, `{}`-escaped literals and anything malformed.
pub fn parse(value: &str) -> Option<MarkupExtension> {
    let trimmed = value.trim();
    if !trimmed.starts_with('{') || trimmed.starts_with("{}") {
        return None;
    }
    let mut parser = Parser::new(trimmed);
    let ext = parser.extension()?;
    parser.skip_ws();
    parser.at_end().then_some(ext)
}

/// Resource keys referenced by an attribute value; empty if it is not a markup extension.
pub fn references_in(value: &str) -> Vec<String> {
    parse(value)
        .map(|ext| ext.resource_references())
        .unwrap_or_default()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn extension(&mut self) -> Option<MarkupExtension> {
        if !self.eat('{') {
            return None;
        }
        self.skip_ws();
        let name = self.name();
        if name.is_empty() {
            return None;
        }

        let mut ext = MarkupExtension {
            name,
            positional: Vec::new(),
            named: Vec::new(),
        };

        self.skip_ws();
        if self.eat('}') {
            return Some(ext);
        }

        loop {
            self.skip_ws();
            let value = self.value()?;
            self.skip_ws();
            if self.eat('=') {
                // what we read was a member name
                let member = match value {
                    MarkupValue::Text(member) if !member.is_empty() => member,
                    _ => return None,
                };
                self.skip_ws();
                let value = self.value()?;
                ext.named.push((member, value));
            } else {
                ext.positional.push(value);
            }

            self.skip_ws();
            match self.bump()? {
                ',' => continue,
                '}' => return Some(ext),
                _ => return None,
            }
        }
    }

    fn name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | ',' | '=') {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        name
    }

    fn value(&mut self) -> Option<MarkupValue> {
        match self.peek()? {
            '{' if self.chars.get(self.pos + 1) != Some(&'}') => {
                self.extension().map(MarkupValue::Extension)
            }
            quote @ ('\'' | '"') => {
                self.pos += 1;
                let mut text = String::new();
                loop {
                    match self.bump()? {
                        '\\' => text.push(self.bump()?),
                        c if c == quote => break,
                        c => text.push(c),
                    }
                }
                Some(MarkupValue::Text(text))
            }
            _ => Some(MarkupValue::Text(self.text_run())),
        }
    }

    fn text_run(&mut self) -> String {
        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ',' | '}' | '=' if depth == 0 => break,
                '{' => depth += 1,
                '}' => depth -= 1,
                '\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                    continue;
                }
                _ => {}
            }
            text.push(c);
            self.pos += 1;
        }
        text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_static_and_dynamic_references() {
        assert_eq!(references_in("{StaticResource Accent}"), vec!["Accent"]);
        assert_eq!(references_in("{DynamicResource  Accent }"), vec!["Accent"]);
        assert_eq!(references_in("{ThemeResource SystemAccent}"), vec!["SystemAccent"]);
    }

    #[test]
    fn resource_key_named_argument() {
        assert_eq!(
            references_in("{StaticResource ResourceKey=AccentBrush}"),
            vec!["AccentBrush"]
        );
    }

    #[test]
    fn nested_reference_inside_binding() {
        assert_eq!(
            references_in("{Binding IsOpen, Converter={StaticResource BoolToVisibility}, Mode=OneWay}"),
            vec!["BoolToVisibility"]
        );
    }

    #[test]
    fn multiple_nested_references() {
        let refs = references_in(
            "{Binding Value, Converter={StaticResource Conv}, ConverterParameter={DynamicResource Param}}",
        );
        assert_eq!(refs, vec!["Conv", "Param"]);
    }

    #[test]
    fn non_literal_key_is_not_a_reference() {
        // the key is itself computed by x:Static, so there is no literal to order by
        assert!(references_in("{StaticResource {x:Static local:Keys.Accent}}").is_empty());
    }

    #[test]
    fn non_reference_extensions_have_no_keys() {
        assert!(references_in("{x:Type Button}").is_empty());
        assert!(references_in("{x:Static SystemColors.HighlightBrush}").is_empty());
        assert!(references_in("{Binding}").is_empty());
    }

    #[test]
    fn plain_and_escaped_values_are_not_extensions() {
        assert!(parse("#FF0000").is_none());
        assert!(parse("{}{StaticResource NotReally}").is_none());
        assert!(references_in("{}{StaticResource NotReally}").is_empty());
    }

    #[test]
    fn malformed_values_are_tolerated() {
        assert!(parse("{StaticResource Accent").is_none());
        assert!(parse("{StaticResource Accent} trailing").is_none());
        assert!(parse("{").is_none());
        assert!(references_in("{Binding Path=(a,b").is_empty());
    }

    #[test]
    fn quoted_text_keeps_separators() {
        let ext = parse("{Binding StringFormat='{}{0:N2}, more', Path=Value}").unwrap();
        assert_eq!(
            ext.named_argument("StringFormat"),
            Some(&MarkupValue::Text("{}{0:N2}, more".to_string()))
        );
        assert_eq!(
            ext.named_argument("Path"),
            Some(&MarkupValue::Text("Value".to_string()))
        );
    }

    #[test]
    fn prefixed_keyword_is_recognized() {
        let ext = parse("{x:StaticResource Accent}").unwrap();
        assert_eq!(ext.local_name(), "StaticResource");
        assert_eq!(ext.referenced_key(), Some("Accent"));
    }
}
