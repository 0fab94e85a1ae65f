// Bridge module - The consumer-loop side of the dispatch bridge
//
// This module contains:
// - EventLoopBridge: Posts deliveries to the consumer loop and spawns work on tokio
// - DeliverySink / ConsumerQueue: Pluggable, non-blocking delivery targets
// - Dispatcher: start_analysis / start_load entry points

pub mod dispatcher;
pub mod event_loop;

pub use dispatcher::Dispatcher;
pub use event_loop::{ConsumerQueue, DeliverySink, EventLoopBridge};
