use encoding_rs::WINDOWS_1251;
use std::fmt;

/// Encodings tried, in order, when a file is not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Windows1251,
    Latin1,
}

impl SourceEncoding {
    pub const FALLBACK_ORDER: [Self; 3] = [Self::Utf8, Self::Windows1251, Self::Latin1];

    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Windows1251 => "windows-1251",
            Self::Latin1 => "latin-1",
        }
    }

    /// Decode without replacement characters; `None` if any byte is unmapped.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Self::Windows1251 => WINDOWS_1251
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
            // every byte is the code point of the same value
            Self::Latin1 => Some(bytes.iter().map(|&byte| char::from(byte)).collect()),
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// First encoding in [`SourceEncoding::FALLBACK_ORDER`] that decodes `bytes`.
pub fn decode(bytes: &[u8]) -> Option<(String, SourceEncoding)> {
    SourceEncoding::FALLBACK_ORDER
        .into_iter()
        .find_map(|encoding| encoding.decode(bytes).map(|text| (text, encoding)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prefers_utf8() {
        assert_eq!(
            decode("import os # ok".as_bytes()),
            Some(("import os # ok".to_string(), SourceEncoding::Utf8))
        );
    }

    #[test]
    fn cyrillic_falls_back_to_windows_1251() {
        let (bytes, _, had_errors) = WINDOWS_1251.encode("# Привет, мир\nimport os\n");
        assert!(!had_errors);
        assert_eq!(
            decode(&bytes),
            Some(("# Привет, мир\nimport os\n".to_string(), SourceEncoding::Windows1251))
        );
    }

    #[test]
    fn latin1_maps_every_byte() {
        let text = SourceEncoding::Latin1.decode(&[b'a', 0xe9, 0xff]).unwrap();
        assert_eq!(text, "aéÿ");
    }
}
