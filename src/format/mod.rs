//! Output formats
//!
//! A `FormatSink` receives the header once, then every block, then the
//! totals row if the query produced one.

mod json_each_row;
mod tab_separated;

pub use json_each_row::JsonEachRow;
pub use tab_separated::TabSeparated;

use std::io;

use crate::block::Block;
use crate::error::{QueryError, QueryResult};
use crate::stream::BlockStream;

pub trait FormatSink {
    fn write_prefix(&mut self, _header: &Block) -> io::Result<()> {
        Ok(())
    }

    fn write_block(&mut self, block: &Block) -> io::Result<()>;

    /// Formats without a totals section ignore it
    fn write_totals(&mut self, _totals: &Block) -> io::Result<()> {
        Ok(())
    }

    fn write_suffix(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Drains `stream` into `sink`
pub fn copy_data(stream: &mut dyn BlockStream, sink: &mut dyn FormatSink) -> QueryResult<()> {
    sink.write_prefix(stream.header()).map_err(output_failed)?;
    while let Some(block) = stream.read()? {
        sink.write_block(&block).map_err(output_failed)?;
    }
    if let Some(totals) = stream.totals() {
        sink.write_totals(&totals).map_err(output_failed)?;
    }
    sink.write_suffix().map_err(output_failed)
}

fn output_failed(err: io::Error) -> QueryError {
    QueryError::execution_failed(format!("Cannot write output: {}", err))
}
