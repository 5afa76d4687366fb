//! The token grammar: a fixed ordered list of compiled patterns applied to
//! comment-stripped source text.
//!
//! Every non-overlapping match of every pattern is emitted as a typed
//! token; the stream is sorted by match start with a stable sort, so
//! equal-start ties keep the declaration order of the pattern list. Later
//! stages rely on this first-applicable-token ordering -- it is contract,
//! not implementation detail.

use regex::{Captures, Regex};

/// Language codes recognized in language-binding filenames and
/// environments.
pub const LANGS: [&str; 9] = ["de", "en", "zhs", "zht", "ro", "tu", "ru", "fi", "fr"];

pub fn is_lang(code: &str) -> bool {
    LANGS.contains(&code)
}

fn lang_pattern() -> String {
    LANGS
        .iter()
        .map(|l| format!("({})", l))
        .collect::<Vec<_>>()
        .join("|")
}

/// Macro environment kinds. Each begin token carries its kind; end tokens
/// are matched by value against the kind (and blind flag) of the
/// environment they close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKind {
    /// `module` -- monolingual module with inline verbalizations
    Module,
    /// `modsig` -- module signature declaring symbols
    ModSig,
    /// `mhmodnl` -- language binding verbalizing a signature
    LangBinding,
    /// `gviewsig` -- view signature
    ViewSig,
    /// `gviewnl` -- view language binding
    ViewBinding,
    /// `omgroup` / `blindomgroup` -- document outline grouping
    OmGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EnvBegin(EnvKind),
    EnvEnd(EnvKind),
    Defi,
    Trefi,
    Symi,
    Symdef,
    ImportModule,
    UseModule,
    GImport,
    GUse,
    InputRef,
    CoverageMarker,
}

/// Captured pieces of a token, typed by shape rather than by raw group
/// index.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Environment begin: `name`/`lang` for signatures and bindings,
    /// raw parameter string where the grammar captures one, `title` for
    /// omgroups.
    Env {
        name: Option<String>,
        lang: Option<String>,
        params: Option<String>,
        title: Option<String>,
        blind: bool,
    },
    /// Environment end; `blind` distinguishes `\end{blindomgroup}`.
    End { blind: bool },
    /// defi/trefi family: prefix letters, arity from the suffix, plural
    /// flag, raw parameter string and positional arguments.
    RefMacro {
        prefix: String,
        arity: usize,
        plural: bool,
        params: Option<String>,
        args: Vec<String>,
    },
    /// symi family.
    SymMacro {
        arity: usize,
        params: Option<String>,
        args: Vec<String>,
    },
    /// Single-argument macros: symdef, imports/uses, input references.
    TargetMacro {
        params: Option<String>,
        arg: String,
    },
    /// Marker macros without arguments.
    Marker,
}

/// A single token: kind, byte span, full matched text and typed payload.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub payload: Payload,
}

struct Rule {
    re: Regex,
    kind: TokenKind,
    extract: fn(&Captures) -> Payload,
}

/// An argument: anything brace-balanced one level deep, allowing inline
/// math.
const ARG: &str = r"(?:[^\{\}\$]|(?:\$[^\$]+\$)|(?:\{[^\{\}\$]*\}))+";

fn rule(pattern: String, kind: TokenKind, extract: fn(&Captures) -> Payload) -> Rule {
    Rule {
        re: Regex::new(&pattern).expect("hard-coded token pattern"),
        kind,
        extract,
    }
}

fn group(c: &Captures, name: &str) -> Option<String> {
    c.name(name).map(|m| m.as_str().to_owned())
}

fn arity_of(c: &Captures) -> usize {
    match c.name("arity").map(|m| m.as_str()) {
        Some("i") => 1,
        Some("ii") => 2,
        Some("iii") => 3,
        Some("iv") => 4,
        _ => 0,
    }
}

fn positional_args(c: &Captures, max: usize) -> Vec<String> {
    (0..=max)
        .filter_map(|i| c.name(&format!("arg{}", i)))
        .map(|m| m.as_str().to_owned())
        .collect()
}

fn extract_env_name_lang(c: &Captures) -> Payload {
    Payload::Env {
        name: group(c, "name"),
        lang: group(c, "lang"),
        params: None,
        title: None,
        blind: false,
    }
}

fn extract_env_named(c: &Captures) -> Payload {
    Payload::Env {
        name: group(c, "name"),
        lang: None,
        params: group(c, "params"),
        title: None,
        blind: false,
    }
}

fn extract_env_module(c: &Captures) -> Payload {
    Payload::Env {
        name: None,
        lang: None,
        params: group(c, "params"),
        title: None,
        blind: false,
    }
}

fn extract_env_omgroup(c: &Captures) -> Payload {
    Payload::Env {
        name: None,
        lang: None,
        params: group(c, "params"),
        title: group(c, "arg"),
        blind: c.name("blind").is_some(),
    }
}

fn extract_end(_c: &Captures) -> Payload {
    Payload::End { blind: false }
}

fn extract_end_omgroup(c: &Captures) -> Payload {
    Payload::End {
        blind: c.name("blind").is_some(),
    }
}

fn extract_ref_macro(c: &Captures) -> Payload {
    Payload::RefMacro {
        prefix: group(c, "start").unwrap_or_default(),
        arity: arity_of(c),
        plural: c.name("plurals").is_some_and(|m| !m.as_str().is_empty()),
        params: group(c, "params"),
        args: positional_args(c, 4),
    }
}

fn extract_sym_macro(c: &Captures) -> Payload {
    Payload::SymMacro {
        arity: arity_of(c),
        params: group(c, "params"),
        args: positional_args(c, 3),
    }
}

fn extract_target_macro(c: &Captures) -> Payload {
    Payload::TargetMacro {
        params: group(c, "params"),
        arg: group(c, "arg").unwrap_or_default(),
    }
}

fn extract_marker(_c: &Captures) -> Payload {
    Payload::Marker
}

/// The compiled grammar. Built once per run and threaded by reference;
/// there is no global regex state.
pub struct Grammar {
    rules: Vec<Rule>,
    comment: Regex,
    param: Regex,
    namespace: Regex,
    skip_file: Regex,
}

impl Grammar {
    pub fn new() -> Self {
        let param_list = r"(?:\[(?P<params>[^\]]*)\])?\s*";
        let rules = vec![
            rule(
                r"\\begin\s*\{mhmodnl\}\s*(?:\[[^\]]*\])?\s*\{(?P<name>[\w-]+)\}\s*\{(?P<lang>[\w-]+)\}"
                    .to_owned(),
                TokenKind::EnvBegin(EnvKind::LangBinding),
                extract_env_name_lang,
            ),
            rule(
                r"\\end\s*\{mhmodnl\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::LangBinding),
                extract_end,
            ),
            rule(
                format!(
                    r"\\(?P<start>d|D|ad)ef(?P<arity>i|ii|iii|iv)(?P<plurals>s?)\s*{param_list}\{{(?P<arg0>{ARG})\}}(?:\s*\{{(?P<arg1>{ARG})\}})?(?:\s*\{{(?P<arg2>{ARG})\}})?(?:\s*\{{(?P<arg3>{ARG})\}})?(?:\s*\{{(?P<arg4>{ARG})\}})?"
                ),
                TokenKind::Defi,
                extract_ref_macro,
            ),
            rule(
                r"\\begin\s*\{gviewnl\}\s*(?:\[[^\]]*\])?\s*\{(?P<name>[\w-]+)\}\s*\{(?P<lang>[\w-]+)\}"
                    .to_owned(),
                TokenKind::EnvBegin(EnvKind::ViewBinding),
                extract_env_name_lang,
            ),
            rule(
                r"\\end\s*\{gviewnl\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::ViewBinding),
                extract_end,
            ),
            rule(
                format!(
                    r"\\(?P<start>at|mt|t|Mt|T|d|D)ref(?P<arity>i|ii|iii|iv)(?P<plurals>s?)\s*{param_list}\{{(?P<arg0>{ARG})\}}(?:\s*\{{(?P<arg1>{ARG})\}})?(?:\s*\{{(?P<arg2>{ARG})\}})?(?:\s*\{{(?P<arg3>{ARG})\}})?(?:\s*\{{(?P<arg4>{ARG})\}})?"
                ),
                TokenKind::Trefi,
                extract_ref_macro,
            ),
            rule(
                format!(
                    r"\\begin\s*\{{modsig\}}\s*{param_list}\{{(?P<name>[\w\.-]+)\}}"
                ),
                TokenKind::EnvBegin(EnvKind::ModSig),
                extract_env_named,
            ),
            rule(
                r"\\end\s*\{modsig\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::ModSig),
                extract_end,
            ),
            rule(
                format!(
                    r"\\sym(?P<arity>i|ii|iii|iv)\*?\s*{param_list}\{{(?P<arg0>{ARG})\}}(?:\s*\{{(?P<arg1>{ARG})\}})?(?:\s*\{{(?P<arg2>{ARG})\}})?(?:\s*\{{(?P<arg3>{ARG})\}})?"
                ),
                TokenKind::Symi,
                extract_sym_macro,
            ),
            rule(
                r"\\begin\s*\{gviewsig\}\s*(?:\[[^\]]*\])?\s*\{(?P<name>[\w-]+)\}".to_owned(),
                TokenKind::EnvBegin(EnvKind::ViewSig),
                extract_env_named,
            ),
            rule(
                r"\\end\s*\{gviewsig\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::ViewSig),
                extract_end,
            ),
            rule(
                format!(r"\\symdef\s*{param_list}\{{(?P<arg>{ARG})\}}"),
                TokenKind::Symdef,
                extract_target_macro,
            ),
            rule(
                format!(r"\\begin\s*\{{module\}}\s*{param_list}"),
                TokenKind::EnvBegin(EnvKind::Module),
                extract_env_module,
            ),
            rule(
                r"\\end\s*\{module\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::Module),
                extract_end,
            ),
            rule(
                format!(r"\\importmhmodule\s*{param_list}\{{(?P<arg>{ARG})\}}"),
                TokenKind::ImportModule,
                extract_target_macro,
            ),
            rule(
                format!(r"\\usemhmodule\s*{param_list}\{{(?P<arg>{ARG})\}}"),
                TokenKind::UseModule,
                extract_target_macro,
            ),
            rule(
                format!(r"\\gimport\*?\s*{param_list}\{{(?P<arg>{ARG})\}}"),
                TokenKind::GImport,
                extract_target_macro,
            ),
            rule(
                format!(r"\\guse\s*{param_list}\{{(?P<arg>{ARG})\}}"),
                TokenKind::GUse,
                extract_target_macro,
            ),
            rule(
                format!(
                    r"\\(?:mhinputref|input)\*?\s*{param_list}\{{(?P<arg>{ARG})\}}"
                ),
                TokenKind::InputRef,
                extract_target_macro,
            ),
            rule(
                format!(
                    r"\\begin\{{(?P<blind>blind)?omgroup\}}{param_list}(?:\{{(?P<arg>{ARG})\}})?"
                ),
                TokenKind::EnvBegin(EnvKind::OmGroup),
                extract_env_omgroup,
            ),
            rule(
                r"\\end\{(?P<blind>blind)?omgroup\}".to_owned(),
                TokenKind::EnvEnd(EnvKind::OmGroup),
                extract_end_omgroup,
            ),
            rule(
                r"\\covereduptohere".to_owned(),
                TokenKind::CoverageMarker,
                extract_marker,
            ),
        ];

        Grammar {
            rules,
            comment: Regex::new(r"(^|\n)[\t ]*%[^\n]*\n").expect("hard-coded pattern"),
            param: Regex::new(
                r"(?P<key>[a-zA-Z0-9_-]+)(?:=(?P<val>(?:[^\{\},]+)|(?:\{[^\{\}]+\})))?",
            )
            .expect("hard-coded pattern"),
            namespace: Regex::new(&format!(
                r"\\namespace\s*(?:\[[^\]]*\])?\s*\{{(?P<arg>{ARG})\}}"
            ))
            .expect("hard-coded pattern"),
            skip_file: Regex::new(&format!(
                r"^(((localpaths)|(all))|(((all)|(glossary))\.({})))\.tex$",
                lang_pattern()
            ))
            .expect("hard-coded pattern"),
        }
    }

    /// Blank every line that consists only of whitespace and a comment,
    /// keeping its newline so line numbers stay stable. Applied repeatedly
    /// to a fixed point, which makes the whole operation idempotent.
    pub fn strip_comments(&self, text: &str) -> String {
        let mut current = text.to_owned();
        loop {
            let next = self.comment.replace_all(&current, "${1}\n").into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Emit every match of every pattern, sorted by match start. The sort
    /// is stable and matches are collected in pattern-list order, so
    /// equal-start ties keep declaration order.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for r in &self.rules {
            for caps in r.re.captures_iter(text) {
                let m = caps.get(0).expect("whole-match group");
                tokens.push(Token {
                    kind: r.kind,
                    start: m.start(),
                    end: m.end(),
                    text: m.as_str().to_owned(),
                    payload: (r.extract)(&caps),
                });
            }
        }
        tokens.sort_by_key(|t| t.start);
        tokens
    }

    /// Parse a raw `[...]` parameter string into an ordered key/value
    /// sequence. Keys are unique; the FIRST occurrence wins, scanning left
    /// to right.
    pub fn params(&self, raw: Option<&str>) -> Params {
        let mut out: Vec<(String, Option<String>)> = Vec::new();
        if let Some(raw) = raw {
            for caps in self.param.captures_iter(raw) {
                let key = caps.name("key").expect("key group").as_str();
                if out.iter().any(|(k, _)| k == key) {
                    continue;
                }
                out.push((
                    key.to_owned(),
                    caps.name("val").map(|m| m.as_str().to_owned()),
                ));
            }
        }
        Params(out)
    }

    /// Extract the `\namespace{...}` argument from preamble text.
    pub fn namespace(&self, text: &str) -> Option<String> {
        self.namespace
            .captures(text)
            .and_then(|c| c.name("arg").map(|m| m.as_str().to_owned()))
    }

    /// Whether a filename is one of the generated aggregation files that
    /// the harvester skips (`localpaths.tex`, `all.tex`, `all.<lang>.tex`,
    /// `glossary.<lang>.tex`).
    pub fn is_skipped_filename(&self, filename: &str) -> bool {
        self.skip_file.is_match(filename)
    }

    #[cfg(test)]
    fn with_test_rules(patterns: Vec<(&str, TokenKind)>) -> Self {
        let mut g = Grammar::new();
        g.rules = patterns
            .into_iter()
            .map(|(p, k)| rule(p.to_owned(), k, extract_marker))
            .collect();
        g
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

/// Ordered key -> optional-value parameter mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<(String, Option<String>)>);

impl Params {
    /// Value of a key, if the key is present with a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
