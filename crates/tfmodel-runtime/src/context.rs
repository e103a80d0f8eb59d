//! Per-request state of one `execute` call.

use crate::handle::NativeTensor;
use crate::session::LoadedSession;
use std::time::Instant;
use tfmodel_core::{decode_inputs, HostValue, NamedTensor, OutputTensor, Result};
use tracing::debug;

/// Decoded inputs and requested outputs of one request.
///
/// Built on the caller's thread and moved whole into the background run.
/// Only plain [`OutputTensor`] data comes back; every native tensor is
/// created and released inside [`RequestContext::run`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    inputs: Vec<NamedTensor>,
    output_names: Vec<String>,
}

impl RequestContext {
    /// Context from already decoded inputs.
    pub fn new(inputs: Vec<NamedTensor>, output_names: Vec<String>) -> Self {
        Self {
            inputs,
            output_names,
        }
    }

    /// Decode host request data.
    pub fn decode<S: AsRef<str>>(inputs: &HostValue, output_names: &[S]) -> Result<Self> {
        let inputs = decode_inputs(inputs)?;
        let output_names = output_names
            .iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        Ok(Self::new(inputs, output_names))
    }

    /// Input tensors, in request order.
    pub fn inputs(&self) -> &[NamedTensor] {
        &self.inputs
    }

    /// Requested output names, in request order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Run the request against `session`.
    ///
    /// Returns one output per requested name, in the same order. Input
    /// tensors are released right after the engine call; output tensors once
    /// their data has been copied out.
    pub fn run(self, session: &LoadedSession) -> Result<Vec<OutputTensor>> {
        let engine_session = session.engine_session();
        let graph = engine_session.graph();

        let input_ops = self
            .inputs
            .iter()
            .map(|input| graph.output(input.name()))
            .collect::<Result<Vec<_>>>()?;
        let output_ops = self
            .output_names
            .iter()
            .map(|name| graph.output(name))
            .collect::<Result<Vec<_>>>()?;

        let input_values = self
            .inputs
            .iter()
            .map(|input| NativeTensor::borrowed(engine_session.engine(), input))
            .collect::<Result<Vec<_>>>()?;

        let started = Instant::now();
        let produced = {
            let _gate = session.lock_runs();
            engine_session.run(&input_ops, &input_values, &output_ops)
        };
        drop(input_values);

        let elapsed = started.elapsed();
        session.record_run(elapsed, produced.is_ok());
        let produced = produced?;
        debug!(
            session = %session.id(),
            inputs = self.inputs.len(),
            outputs = produced.len(),
            ?elapsed,
            "run finished"
        );

        Ok(self
            .output_names
            .iter()
            .zip(&produced)
            .map(|(name, tensor)| tensor.to_output(name))
            .collect())
    }
}
