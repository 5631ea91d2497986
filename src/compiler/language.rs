//! `lang:` filter support: language names to file extension regexes

use super::error::CompileError;

const LANGUAGES: &[(&[&str], &[&str])] = &[
    (&["c"], &["c", "h"]),
    (&["c++", "cpp"], &["cc", "cpp", "cxx", "hh", "hpp", "hxx"]),
    (&["c#", "csharp"], &["cs"]),
    (&["css"], &["css"]),
    (&["go", "golang"], &["go"]),
    (&["haskell"], &["hs"]),
    (&["html"], &["htm", "html"]),
    (&["java"], &["java"]),
    (&["javascript", "js"], &["js", "jsx", "mjs"]),
    (&["json"], &["json"]),
    (&["kotlin"], &["kt", "kts"]),
    (&["markdown"], &["md", "markdown"]),
    (&["php"], &["php"]),
    (&["python", "py"], &["py"]),
    (&["ruby"], &["rb"]),
    (&["rust"], &["rs"]),
    (&["scala"], &["scala"]),
    (&["shell", "bash"], &["sh", "bash"]),
    (&["sql"], &["sql"]),
    (&["swift"], &["swift"]),
    (&["toml"], &["toml"]),
    (&["typescript", "ts"], &["ts", "tsx"]),
    (&["yaml"], &["yml", "yaml"]),
];

/// File extensions for a language name (case-insensitive)
pub fn extensions(language: &str) -> Option<&'static [&'static str]> {
    let lower = language.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(names, _)| names.contains(&lower.as_str()))
        .map(|(_, exts)| *exts)
}

/// One `\.ext$` regex per extension of the language
pub fn language_path_regexps(language: &str) -> Result<Vec<String>, CompileError> {
    let exts =
        extensions(language).ok_or_else(|| CompileError::UnknownLanguage(language.to_string()))?;
    Ok(exts
        .iter()
        .map(|ext| format!(r"\.{}$", regex::escape(ext)))
        .collect())
}
