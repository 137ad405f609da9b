//! Command-name <-> source-identifier casing
//!
//! Commands are typed in kebab case (`say-hello`); JVM and Haskell sources
//! are named in upper camel case (`SayHello.java`). A non-initial word that
//! starts with a digit has no upper-case letter to mark its start, so it is
//! carried as `_<word>` in the identifier (`foo-2bar` <-> `Foo_2bar`).

use once_cell::sync::Lazy;
use regex::Regex;

static RE_CAMEL_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z][a-z0-9]*").unwrap());

static RE_DIGIT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([0-9])").unwrap());

/// `SayHello` -> `say-hello`
pub fn camel_to_kebab(identifier: &str) -> String {
    let s = RE_DIGIT_WORD.replace_all(identifier, "-$1");
    let s = RE_CAMEL_WORD.replace_all(&s, |caps: &regex::Captures| {
        format!("-{}", caps[0].to_lowercase())
    });
    s.trim_start_matches('-').to_string()
}

/// `say-hello` -> `SayHello`
pub fn kebab_to_camel(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    for (i, word) in command.split('-').enumerate() {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() => {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
            Some(_) if i > 0 => {
                out.push('_');
                out.push_str(word);
            }
            _ => out.push_str(word),
        }
    }
    out
}

/// Command name for a source identifier, when the identifier is in the
/// canonical form [`kebab_to_camel`] produces (`SayHello`, not `sayHello`).
pub fn command_for_identifier(identifier: &str) -> Option<String> {
    let command = camel_to_kebab(identifier);
    (kebab_to_camel(&command) == identifier).then_some(command)
}

/// Source identifier for a command name, when the name is canonical
/// kebab case (`say-hello`, not `SayHello`).
pub fn identifier_for_command(command: &str) -> Option<String> {
    let identifier = kebab_to_camel(command);
    (camel_to_kebab(&identifier) == command).then_some(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_kebab() {
        assert_eq!(camel_to_kebab("SayHello"), "say-hello");
        assert_eq!(camel_to_kebab("Main"), "main");
        assert_eq!(camel_to_kebab("HttpGet2"), "http-get2");
        assert_eq!(camel_to_kebab("Foo_2bar"), "foo-2bar");
        assert_eq!(camel_to_kebab("lowercase"), "lowercase");
    }

    #[test]
    fn test_kebab_to_camel() {
        assert_eq!(kebab_to_camel("say-hello"), "SayHello");
        assert_eq!(kebab_to_camel("main"), "Main");
        assert_eq!(kebab_to_camel("http-get2"), "HttpGet2");
        assert_eq!(kebab_to_camel("foo-2bar"), "Foo_2bar");
        assert_eq!(kebab_to_camel("2fa-tool"), "2faTool");
    }

    #[test]
    fn test_round_trip() {
        let names = [
            "a",
            "say-hello",
            "a-b-c",
            "abc1-x",
            "x1-y2-z3",
            "foo-2bar",
            "v-2",
            "2fa-tool",
            "9",
            "build-all-the-things",
            "k8s-ctl",
        ];
        for name in names {
            assert_eq!(camel_to_kebab(&kebab_to_camel(name)), name, "round trip of {name}");
        }
    }

    #[test]
    fn test_canonical_forms_only() {
        assert_eq!(command_for_identifier("SayHello").as_deref(), Some("say-hello"));
        assert_eq!(command_for_identifier("Foo_2bar").as_deref(), Some("foo-2bar"));
        assert_eq!(command_for_identifier("sayHello"), None);
        assert_eq!(command_for_identifier("hello_world"), None);

        assert_eq!(identifier_for_command("say-hello").as_deref(), Some("SayHello"));
        assert_eq!(identifier_for_command("SayHello"), None);
        assert_eq!(identifier_for_command("say--hello"), None);
    }
}
