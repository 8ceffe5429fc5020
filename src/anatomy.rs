//! SNOMED-RT codes offered for segment category, type and modifier.

pub const CODING_SCHEME_DESIGNATOR: &str = "SRT";

/// Default category and type: Tissue.
pub const DEFAULT_CODE: &str = "T-D0050";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRole {
    Category,
    Type,
    Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnatomyCode {
    pub value: &'static str,
    pub meaning: &'static str,
    pub role: CodeRole,
}

const fn code(value: &'static str, meaning: &'static str, role: CodeRole) -> AnatomyCode {
    AnatomyCode {
        value,
        meaning,
        role,
    }
}

pub const CODES: &[AnatomyCode] = &[
    code("T-D0050", "Tissue", CodeRole::Category),
    code("T-D000A", "Anatomical Structure", CodeRole::Category),
    code("M-01000", "Morphologically Altered Structure", CodeRole::Category),
    code("T-32000", "Heart", CodeRole::Type),
    code("T-28000", "Lung", CodeRole::Type),
    code("T-62000", "Liver", CodeRole::Type),
    code("T-71000", "Kidney", CodeRole::Type),
    code("T-A0100", "Brain", CodeRole::Type),
    code("M-03000", "Mass", CodeRole::Type),
    code("M-80003", "Neoplasm", CodeRole::Type),
    code("G-A100", "Right", CodeRole::Modifier),
    code("G-A101", "Left", CodeRole::Modifier),
    code("G-A102", "Bilateral", CodeRole::Modifier),
];

/// Find a code by its value. `T-D0050` is both a category and a type and
/// resolves to the category entry; the meaning is the same.
pub fn lookup(value: &str) -> Option<&'static AnatomyCode> {
    CODES.iter().find(|code| code.value == value)
}

/// Human-readable meaning of a code value, falling back to the value itself.
pub fn meaning(value: &str) -> &str {
    lookup(value).map_or(value, |code| code.meaning)
}
