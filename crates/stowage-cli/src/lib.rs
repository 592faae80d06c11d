use std::path::Path;

/// Content type for a local file, judged by its extension.
pub fn mime_type_for(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Initialize tracing for the CLI. Logs go to stderr so stdout stays JSON.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_known_extensions() {
        assert_eq!(mime_type_for(Path::new("a/b.PNG")).as_deref(), Some("image/png"));
        assert_eq!(
            mime_type_for(Path::new("report.pdf")).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(mime_type_for(Path::new("notes.md")).as_deref(), Some("text/markdown"));
        assert_eq!(mime_type_for(Path::new("x.wasm")).as_deref(), Some("application/wasm"));
    }

    #[test]
    fn mime_type_unknown_or_missing() {
        assert_eq!(mime_type_for(Path::new("archive.zzqx")), None);
        assert_eq!(mime_type_for(Path::new("Makefile")), None);
    }
}
