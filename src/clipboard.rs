use tracing::debug;

/// Put `text` on the system clipboard.
/// Headless sessions have no clipboard; callers fall back to printing.
pub fn copy(text: &str) -> Result<(), arboard::Error> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text)?;
    debug!("Copied {} chars to clipboard", text.chars().count());
    Ok(())
}
