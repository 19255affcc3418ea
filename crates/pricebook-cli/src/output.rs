use std::io::Write;

use serde_json::Value;

use crate::error::CliError;

pub fn render(value: &Value, pretty: bool) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    write_json(&mut stdout.lock(), value, pretty)
}

fn write_json<W: Write>(writer: &mut W, value: &Value, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, value)?;
    } else {
        serde_json::to_writer(&mut *writer, value)?;
    }
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_and_pretty_forms_end_with_newline() {
        let value = serde_json::json!({ "total": 1 });

        let mut compact = Vec::new();
        write_json(&mut compact, &value, false).expect("compact");
        assert_eq!(String::from_utf8(compact).expect("utf8"), "{\"total\":1}\n");

        let mut pretty = Vec::new();
        write_json(&mut pretty, &value, true).expect("pretty");
        assert_eq!(
            String::from_utf8(pretty).expect("utf8"),
            "{\n  \"total\": 1\n}\n"
        );
    }
}
