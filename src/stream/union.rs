//! Parallel fan-in of several streams

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::block::Block;
use crate::error::{QueryError, QueryResult};

use super::{BlockStream, BoxedStream, PlanNode};

/// Blocks in flight per worker before it waits for the consumer
const BLOCKS_PER_WORKER: usize = 2;

enum Message {
    Block(Block),
    Finished(Option<Block>),
    Failed(QueryError),
}

/// Reads every input on its own worker thread and yields blocks in arrival
/// order. Workers are started by the first `read`. Dropping the stream
/// cancels and joins them, which drops their inputs.
pub struct UnionStream {
    header: Block,
    pending: Vec<BoxedStream>,
    children: Vec<PlanNode>,
    receiver: Option<Receiver<Message>>,
    workers: Vec<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    running: usize,
    totals: Option<Block>,
}

impl UnionStream {
    pub fn new(inputs: Vec<BoxedStream>) -> Self {
        let header = inputs
            .first()
            .map(|input| input.header().clone_empty())
            .unwrap_or_default();
        let children = inputs.iter().map(|input| input.explain()).collect();
        Self {
            header,
            pending: inputs,
            children,
            receiver: None,
            workers: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            running: 0,
            totals: None,
        }
    }

    fn start(&mut self) -> QueryResult<()> {
        let inputs = std::mem::take(&mut self.pending);
        let (sender, receiver) = sync_channel(inputs.len().max(1) * BLOCKS_PER_WORKER);
        self.receiver = Some(receiver);
        for (i, input) in inputs.into_iter().enumerate() {
            let sender = sender.clone();
            let cancelled = Arc::clone(&self.cancelled);
            let worker = thread::Builder::new()
                .name(format!("union-{}", i))
                .spawn(move || pump(input, sender, cancelled))
                .map_err(|e| {
                    QueryError::execution_failed(format!("Cannot start union worker: {}", e))
                })?;
            self.workers.push(worker);
            self.running += 1;
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // unblocks workers waiting on a full channel
        self.receiver = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.running = 0;
    }
}

fn pump(mut input: BoxedStream, sender: SyncSender<Message>, cancelled: Arc<AtomicBool>) {
    while !cancelled.load(Ordering::SeqCst) {
        let message = match input.read() {
            Ok(Some(block)) => Message::Block(block),
            Ok(None) => {
                let _ = sender.send(Message::Finished(input.totals()));
                return;
            }
            Err(err) => {
                let _ = sender.send(Message::Failed(err));
                return;
            }
        };
        if sender.send(message).is_err() {
            return;
        }
    }
}

impl BlockStream for UnionStream {
    fn header(&self) -> &Block {
        &self.header
    }

    fn read(&mut self) -> QueryResult<Option<Block>> {
        if self.receiver.is_none() && !self.pending.is_empty() {
            self.start()?;
        }
        while self.running > 0 {
            let received = match &self.receiver {
                Some(receiver) => receiver.recv(),
                None => return Ok(None),
            };
            match received {
                Ok(Message::Block(block)) => return Ok(Some(block)),
                Ok(Message::Finished(totals)) => {
                    self.running -= 1;
                    if self.totals.is_none() {
                        self.totals = totals;
                    }
                }
                Ok(Message::Failed(err)) => {
                    self.cancel();
                    return Err(err);
                }
                Err(_) => {
                    self.cancel();
                    return Err(QueryError::execution_failed(
                        "Union worker exited without finishing",
                    ));
                }
            }
        }
        Ok(None)
    }

    fn totals(&self) -> Option<Block> {
        self.totals.clone()
    }

    fn explain(&self) -> PlanNode {
        PlanNode::new("Union")
            .detail(format!("streams: {}", self.children.len()))
            .children(self.children.clone())
    }
}

impl Drop for UnionStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::block::{Column, DataType, Value};
    use crate::error::QueryErrorCode;
    use crate::stream::{read_all, BlocksSource};

    fn block(values: &[u64]) -> Block {
        Block::new(vec![Column::new(
            "x",
            DataType::UInt64,
            values.iter().map(|v| Value::UInt(*v)).collect(),
        )])
    }

    fn source(blocks: Vec<Block>) -> BoxedStream {
        Box::new(BlocksSource::new("t", block(&[]), blocks))
    }

    /// Endless input that counts its drops
    struct Endless {
        header: Block,
        dropped: Arc<AtomicUsize>,
    }

    impl BlockStream for Endless {
        fn header(&self) -> &Block {
            &self.header
        }

        fn read(&mut self) -> QueryResult<Option<Block>> {
            Ok(Some(block(&[1, 2, 3])))
        }

        fn explain(&self) -> PlanNode {
            PlanNode::new("Endless")
        }
    }

    impl Drop for Endless {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Failing(Block);

    impl BlockStream for Failing {
        fn header(&self) -> &Block {
            &self.0
        }

        fn read(&mut self) -> QueryResult<Option<Block>> {
            Err(QueryError::illegal_division())
        }

        fn explain(&self) -> PlanNode {
            PlanNode::new("Failing")
        }
    }

    #[test]
    fn test_union_yields_every_block() {
        let mut stream = UnionStream::new(vec![
            source(vec![block(&[1, 2]), block(&[3])]),
            source(vec![block(&[4])]),
            source(Vec::new()),
        ]);
        let mut values: Vec<Value> = read_all(&mut stream)
            .unwrap()
            .iter()
            .flat_map(|b| b.column(0).values.clone())
            .collect();
        values.sort();
        assert_eq!(values, (1..=4u64).map(Value::UInt).collect::<Vec<_>>());
        assert_eq!(stream.explain().children.len(), 3);
    }

    #[test]
    fn test_drop_mid_stream_joins_workers() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let inputs: Vec<BoxedStream> = (0..3)
            .map(|_| {
                Box::new(Endless {
                    header: block(&[]),
                    dropped: Arc::clone(&dropped),
                }) as BoxedStream
            })
            .collect();
        let mut stream = UnionStream::new(inputs);
        assert!(stream.read().unwrap().is_some());
        drop(stream);
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_worker_error_propagates() {
        let mut stream = UnionStream::new(vec![
            source(vec![block(&[1])]),
            Box::new(Failing(block(&[]))),
        ]);
        let err = read_all(&mut stream).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::IllegalDivision);
    }
}
