mod latency;
mod queue_delay;
mod rate;
mod throughput;

pub use self::{
    latency::Latency, queue_delay::QueueDelayEstimator, rate::Rate,
    throughput::ThroughputEstimator,
};
