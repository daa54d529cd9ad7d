/// Replace `${ENV_VAR}` placeholders in config string values.
///
/// `${ENV_VAR:-fallback}` uses `fallback` when the variable is unset or empty.
/// Unresolvable variables without a fallback are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a caller-supplied variable lookup.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut inner = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                inner.push(c);
            }
            if closed && !inner.is_empty() {
                let (name, fallback) = match inner.split_once(":-") {
                    Some((name, fallback)) => (name, Some(fallback)),
                    None => (inner.as_str(), None),
                };
                match (lookup(name).filter(|v| !v.is_empty()), fallback) {
                    (Some(val), _) => result.push_str(&val),
                    (None, Some(fallback)) => result.push_str(fallback),
                    (None, None) => {
                        // Leave unresolved placeholder as-is.
                        result.push_str("${");
                        result.push_str(&inner);
                        result.push('}');
                    },
                }
            } else {
                // Malformed, emit literal.
                result.push_str("${");
                result.push_str(&inner);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// True if `value` still holds an unresolved `${...}` placeholder.
pub fn has_placeholder(value: &str) -> bool {
    value
        .find("${")
        .is_some_and(|start| value[start..].contains('}'))
}
