use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Write one compact JSON object per line to stdout or a file.
pub fn write_lines<T: serde::Serialize>(
    values: &[T],
    output_path: Option<&str>,
) -> Result<(), String> {
    let mut writer: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .map_err(|e| format!("Failed to create output file '{}': {}", path, e))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    for value in values {
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| format!("JSON serialization failed: {}", e))?;
        writer
            .write_all(b"\n")
            .map_err(|e| format!("Failed to write output: {}", e))?;
    }
    writer
        .flush()
        .map_err(|e| format!("Failed to write output: {}", e))
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Serialize and write in one step, reporting failures on stderr.
pub fn emit<T: serde::Serialize>(value: &T, compact: bool, output_path: Option<&str>) -> bool {
    let result = to_json(value, compact).and_then(|json| write_output(&json, output_path));
    if let Err(e) = &result {
        eprintln!("Error: {}", e);
    }
    result.is_ok()
}
