mod queue;

pub use queue::BlockingQueue;
