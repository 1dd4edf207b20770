use super::messages::Message;
use crate::events::{Output, OutputKind};
use crate::types::OutputBlob;

use std::collections::VecDeque;
use tokio::select;
use tokio::sync::mpsc;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<Message>,
    output_rx: mpsc::UnboundedReceiver<Output>,
    output_buffer: VecDeque<Output>,
    buffered_bytes: usize,
    buffer_limit: usize,
    stdout_subscribers: Vec<mpsc::UnboundedSender<OutputBlob>>,
    stderr_subscribers: Vec<mpsc::UnboundedSender<OutputBlob>>,
    output_pending: bool,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<Message>,
        output_rx: mpsc::UnboundedReceiver<Output>,
        buffer_limit: usize,
    ) {
        let actor = Actor::new(inbox, output_rx, buffer_limit);
        tokio::spawn(async move { actor.run().await });
    }

    fn new(
        inbox: mpsc::UnboundedReceiver<Message>,
        output_rx: mpsc::UnboundedReceiver<Output>,
        buffer_limit: usize,
    ) -> Self {
        Actor {
            inbox,
            output_rx,
            output_buffer: VecDeque::new(),
            buffered_bytes: 0,
            buffer_limit,
            stdout_subscribers: Vec::new(),
            stderr_subscribers: Vec::new(),
            output_pending: true,
        }
    }

    async fn run(mut self) {
        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(Message::Subscribe { kind, subscriber }) => self.subscribe(kind, subscriber),
                        // handle dropped, nobody can subscribe anymore
                        None => return,
                    }
                }
                maybe_output = self.output_rx.recv(), if self.output_pending => {
                    match maybe_output {
                        Some(output) => self.publish(output),
                        None => {
                            // dropping the senders closes every subscriber's stream
                            self.stdout_subscribers.clear();
                            self.stderr_subscribers.clear();
                            self.output_pending = false;
                        }
                    }
                }
            }
        }
    }

    fn publish(&mut self, output: Output) {
        let (subscribers, blob) = match &output {
            Output::Stdout(blob) => (&mut self.stdout_subscribers, blob),
            Output::Stderr(blob) => (&mut self.stderr_subscribers, blob),
        };
        // only retain subscribers who have not dropped
        subscribers.retain(|sub| sub.send(blob.clone()).is_ok());
        self.buffer(output);
    }

    /// Keep `output` for replay, evicting the oldest output past the limit.
    fn buffer(&mut self, output: Output) {
        self.buffered_bytes += output.blob().len();
        self.output_buffer.push_back(output);
        while self.buffered_bytes > self.buffer_limit {
            match self.output_buffer.pop_front() {
                Some(evicted) => self.buffered_bytes -= evicted.blob().len(),
                None => break,
            }
        }
    }

    fn subscribe(&mut self, kind: OutputKind, subscriber: mpsc::UnboundedSender<OutputBlob>) {
        let replay = self.output_buffer.iter().filter_map(|output| match (kind, output) {
            (OutputKind::Stdout | OutputKind::All, Output::Stdout(blob)) => Some(blob),
            (OutputKind::Stderr | OutputKind::All, Output::Stderr(blob)) => Some(blob),
            _ => None,
        });
        for blob in replay {
            if subscriber.send(blob.clone()).is_err() {
                return;
            }
        }
        if !self.output_pending {
            return;
        }
        match kind {
            OutputKind::Stdout => self.stdout_subscribers.push(subscriber),
            OutputKind::Stderr => self.stderr_subscribers.push(subscriber),
            OutputKind::All => {
                self.stdout_subscribers.push(subscriber.clone());
                self.stderr_subscribers.push(subscriber);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn actor(buffer_limit: usize) -> Actor {
        let (_, inbox) = mpsc::unbounded_channel();
        let (_, output_rx) = mpsc::unbounded_channel();
        Actor::new(inbox, output_rx, buffer_limit)
    }

    fn replay(actor: &mut Actor, kind: OutputKind) -> Vec<Bytes> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        actor.subscribe(kind, tx);
        let mut blobs = vec![];
        while let Ok(blob) = rx.try_recv() {
            blobs.push(blob);
        }
        blobs
    }

    #[test]
    fn replay_keeps_the_newest_output_within_the_limit() {
        let mut actor = actor(8);
        actor.publish(Output::Stdout(Bytes::from_static(b"aaaa")));
        actor.publish(Output::Stderr(Bytes::from_static(b"bbbb")));
        actor.publish(Output::Stdout(Bytes::from_static(b"cccc")));
        assert_eq!(actor.buffered_bytes, 8);
        assert_eq!(
            replay(&mut actor, OutputKind::All),
            vec![Bytes::from_static(b"bbbb"), Bytes::from_static(b"cccc")]
        );
        assert_eq!(
            replay(&mut actor, OutputKind::Stdout),
            vec![Bytes::from_static(b"cccc")]
        );
    }

    #[test]
    fn oversized_output_is_streamed_but_not_kept() {
        let mut actor = actor(4);
        let (tx, mut live) = mpsc::unbounded_channel();
        actor.subscribe(OutputKind::Stdout, tx);
        actor.publish(Output::Stdout(Bytes::from_static(b"too long")));
        assert_eq!(live.try_recv().unwrap(), Bytes::from_static(b"too long"));
        assert_eq!(actor.buffered_bytes, 0);
        assert!(replay(&mut actor, OutputKind::Stdout).is_empty());
    }
}
