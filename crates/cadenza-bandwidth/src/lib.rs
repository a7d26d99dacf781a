//! Bandwidth estimation.
//!
//! [`DefaultBandwidthMeter`] observes transfers as a
//! [`TransferListener`](cadenza_net::TransferListener), turns finished network
//! transfers into samples, and feeds them to a pluggable
//! [`BandwidthEstimator`]. Estimates are published as an atomic snapshot so
//! the control context never sees a torn value.

#![forbid(unsafe_code)]

mod estimator;
mod meter;
mod options;
mod sample;
mod ttfb;

pub use crate::{
    estimator::{BandwidthEstimator, EwmaEstimator, SlidingPercentileEstimator},
    meter::{BandwidthMeter, DefaultBandwidthMeter},
    options::{BandwidthOptions, EstimatorKind},
    sample::{BandwidthSample, ListenerId},
    ttfb::TimeToFirstByteEstimator,
};

#[cfg(any(test, feature = "test-utils"))]
pub use crate::meter::BandwidthMeterMock;
