use config::Files;
use std::{fs, io, path::Path};

/// Check if a path names a code file, based on its extension.
///
/// ```
/// # use kernel::utils::is_code_file;
/// let extensions = ["py", "rs"];
///
/// assert!(is_code_file("bot.py", &extensions));
/// assert!(is_code_file("src/main.rs", &extensions));
/// assert!(!is_code_file("requirements.txt", &extensions));
/// // no extension at all is never code
/// assert!(!is_code_file("Makefile", &extensions));
/// ```
#[inline]
pub fn is_code_file<T: AsRef<str>>(path: impl AsRef<Path>, extensions: &[T]) -> bool {
    let Some(ext) = path.as_ref().extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(ext))
}

/// Crude structural check: non-blank, and for code at least one declaration
/// token somewhere in the text. Not a parser.
///
/// ```
/// # use kernel::utils::is_plausible;
/// let tokens = ["import", "class", "def"];
///
/// assert!(is_plausible("import os\n", true, &tokens));
/// assert!(!is_plausible("x = 1\n", true, &tokens));
/// assert!(is_plausible("x = 1\n", false, &tokens));
/// assert!(!is_plausible(" \n\t", false, &tokens));
/// ```
#[inline]
pub fn is_plausible<T: AsRef<str>>(content: &str, is_code: bool, tokens: &[T]) -> bool {
    if content.trim().is_empty() {
        return false;
    }
    !is_code || tokens.iter().any(|token| content.contains(token.as_ref()))
}

/// Replace `path` with `bytes` through a sibling temp file, so a crash never
/// leaves it half written. Creates missing parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

/// The plausibility rules shared by the integrity guard and the backup archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRules {
    code_extensions: Vec<String>,
    declaration_tokens: Vec<String>,
}

impl TextRules {
    pub fn new(code_extensions: Vec<String>, declaration_tokens: Vec<String>) -> Self {
        Self {
            code_extensions,
            declaration_tokens,
        }
    }

    pub fn from_config(files: &Files) -> Self {
        Self::new(files.code_extensions.clone(), files.declaration_tokens.clone())
    }

    pub fn is_code(&self, path: impl AsRef<Path>) -> bool {
        is_code_file(path, &self.code_extensions)
    }

    pub fn is_plausible(&self, path: impl AsRef<Path>, content: &str) -> bool {
        is_plausible(content, self.is_code(path), &self.declaration_tokens)
    }

    /// First configured declaration token, used when patching a code file.
    pub fn primary_token(&self) -> Option<&str> {
        self.declaration_tokens.first().map(String::as_str)
    }
}

impl Default for TextRules {
    fn default() -> Self {
        Self::from_config(&Files::default())
    }
}
