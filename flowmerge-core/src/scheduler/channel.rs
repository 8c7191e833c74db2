use crossbeam_channel::{Receiver, RecvError, Sender, TryRecvError, unbounded};

pub enum Received<T> {
    Value(T),
    /// every sender was dropped
    Disconnected,
}

pub struct ResultSender<T> {
    sender: Sender<T>,
}

pub struct ResultReceiver<T> {
    receiver: Receiver<T>,
}

/// Channel carrying completed task results back to the scheduler.
pub fn result_channel<T>() -> (ResultSender<T>, ResultReceiver<T>) {
    let (sender, receiver) = unbounded();
    (ResultSender { sender }, ResultReceiver { receiver })
}

impl<T> ResultSender<T> {
    /// Send a result; returns `false` if the receiver is gone.
    pub fn send(&self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

impl<T> ResultReceiver<T> {
    /// Non-blocking: `None` if no result is ready yet.
    pub fn try_receive(&self) -> Option<Received<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Received::Value(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Received::Disconnected),
        }
    }

    /// Block until a result arrives.
    pub fn receive(&self) -> Received<T> {
        match self.receiver.recv() {
            Ok(value) => Received::Value(value),
            Err(RecvError) => Received::Disconnected,
        }
    }
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_receive_does_not_block() {
        let (sender, receiver) = result_channel::<u32>();

        assert!(receiver.try_receive().is_none());
        assert!(sender.send(42));
        assert!(matches!(receiver.try_receive(), Some(Received::Value(42))));
    }

    #[test]
    fn disconnected() {
        let (sender, receiver) = result_channel::<u32>();
        let other = sender.clone();
        drop(sender);
        assert!(other.send(1));
        drop(other);

        assert!(matches!(receiver.receive(), Received::Value(1)));
        assert!(matches!(receiver.receive(), Received::Disconnected));
        assert!(matches!(receiver.try_receive(), Some(Received::Disconnected)));
    }

    #[test]
    fn send_to_dropped_receiver() {
        let (sender, receiver) = result_channel::<u32>();
        drop(receiver);
        assert!(!sender.send(1));
    }
}
