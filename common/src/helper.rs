/// Formats an error followed by its whole chain of sources, one cause per line.
///
/// Used to implement `Debug` on our error enums, so logging an error with `?error`
/// shows the underlying causes and not only the outermost message.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
