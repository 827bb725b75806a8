use std::borrow::Cow;

/// Returns true for characters allowed to appear in a derived path component.
///
/// Path separators (`/` and `\`) and `.` are kept so that already-joined
/// paths can be passed through unchanged.
#[inline]
fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '\\' | '-')
}

/// Maps arbitrary text onto the filesystem-safe alphabet `[A-Za-z0-9_./\-]`.
///
/// Every character outside the alphabet becomes a single `_`, including
/// multi-byte characters, so the output has exactly as many characters as
/// the input. Borrows when nothing needs replacing.
///
/// # Examples
///
/// ```
/// use podqueue::util::normalize;
///
/// assert_eq!(normalize("My Show: Live!"), "My_Show__Live_");
/// assert_eq!(normalize("2024-01-02_Ep_1.mp3"), "2024-01-02_Ep_1.mp3");
/// ```
pub fn normalize(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_allowed) {
        return Cow::Borrowed(text);
    }

    Cow::Owned(
        text.chars()
            .map(|c| if is_allowed(c) { c } else { '_' })
            .collect(),
    )
}

/// Replaces each space with `_`, the first step of turning a title into a
/// path component.
pub fn underscore_spaces(text: &str) -> String {
    text.split(' ').collect::<Vec<_>>().join("_")
}
