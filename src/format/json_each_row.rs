//! JSONEachRow output

use std::io::{self, Write};

use crate::block::Block;

use super::FormatSink;

/// One JSON object per row, keys in column order
pub struct JsonEachRow<W: Write> {
    writer: W,
    names: Vec<String>,
}

impl<W: Write> JsonEachRow<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            names: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FormatSink for JsonEachRow<W> {
    fn write_prefix(&mut self, header: &Block) -> io::Result<()> {
        // keys are encoded once; serde_json maps would reorder them
        self.names = header
            .names()
            .iter()
            .map(|n| serde_json::to_string(n))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn write_block(&mut self, block: &Block) -> io::Result<()> {
        for row in block.to_rows() {
            let mut fields = Vec::with_capacity(row.len());
            for (name, value) in self.names.iter().zip(&row) {
                fields.push(format!("{}:{}", name, value.to_json()));
            }
            writeln!(self.writer, "{{{}}}", fields.join(","))?;
        }
        Ok(())
    }

    fn write_suffix(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
