//! TabSeparated output

use std::io::{self, Write};

use crate::block::{Block, Value};

use super::FormatSink;

/// One line per row, values separated by tabs. The totals row follows the
/// data after an empty line.
pub struct TabSeparated<W: Write> {
    writer: W,
    with_names: bool,
}

impl<W: Write> TabSeparated<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            with_names: false,
        }
    }

    /// Writes the column names as the first line
    pub fn with_names(writer: W) -> Self {
        Self {
            writer,
            with_names: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_rows(&mut self, block: &Block) -> io::Result<()> {
        for row in block.to_rows() {
            let fields: Vec<String> = row.iter().map(escape_value).collect();
            writeln!(self.writer, "{}", fields.join("\t"))?;
        }
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_value(value: &Value) -> String {
    escape(&value.to_string())
}

impl<W: Write> FormatSink for TabSeparated<W> {
    fn write_prefix(&mut self, header: &Block) -> io::Result<()> {
        if self.with_names {
            let names: Vec<String> = header.names().iter().map(|n| escape(n)).collect();
            writeln!(self.writer, "{}", names.join("\t"))?;
        }
        Ok(())
    }

    fn write_block(&mut self, block: &Block) -> io::Result<()> {
        self.write_rows(block)
    }

    fn write_totals(&mut self, totals: &Block) -> io::Result<()> {
        writeln!(self.writer)?;
        self.write_rows(totals)
    }

    fn write_suffix(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Column, DataType};

    fn block() -> Block {
        Block::new(vec![
            Column::new("k", DataType::UInt64, vec![Value::UInt(1), Value::UInt(2)]),
            Column::new(
                "s",
                DataType::String,
                vec![Value::from("a\tb"), Value::from("line\nbreak\\")],
            ),
        ])
    }

    #[test]
    fn test_escaping() {
        let mut sink = TabSeparated::new(Vec::new());
        sink.write_block(&block()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "1\ta\\tb\n2\tline\\nbreak\\\\\n");
    }

    #[test]
    fn test_names_and_totals() {
        let block = block();
        let mut sink = TabSeparated::with_names(Vec::new());
        sink.write_prefix(&block.clone_empty()).unwrap();
        sink.write_totals(&block.slice(0, 1)).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "k\ts\n\n1\ta\\tb\n");
    }
}
