//! In-process backend that records every call.
//!
//! Used by the unit and integration tests to check camera publishing, light
//! packing and accumulation bookkeeping without any device. Launches write a
//! constant sample into the output using the bound `frame_number`, so the
//! running average stays observable.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use super::{bindings, AccelHandle, AccelInput, Backend, BufferData, GeometryHandle, OutputBuffer};
use crate::accumulation::ManualClock;
use crate::scene::{GeometryInstance, ShapeKind};
use crate::util::{Error, Result};

/// One recorded `launch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRecord {
    pub width: u32,
    pub height: u32,
    pub frame_number: u32,
}

/// One recorded acceleration structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAccel {
    Geometry(Vec<GeometryHandle>),
    Groups(Vec<AccelHandle>),
}

/// Recording backend.
#[derive(Default)]
pub struct MockBackend {
    geometries: Vec<ShapeKind>,
    accelerations: Vec<MockAccel>,
    bindings: HashMap<String, BufferData>,
    bind_log: Vec<String>,
    launches: Vec<LaunchRecord>,
    resizes: Vec<(u32, u32)>,
    output: OutputBuffer,
    validations: usize,
    fail_launch_at: Option<usize>,
    clock: Option<Rc<ManualClock>>,
    launch_cost: Duration,
    sample_value: f32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            sample_value: 1.0,
            ..Default::default()
        }
    }

    /// Advance `clock` by `cost` on every launch.
    pub fn with_clock(mut self, clock: Rc<ManualClock>, cost: Duration) -> Self {
        self.clock = Some(clock);
        self.launch_cost = cost;
        self
    }

    /// Make the launch with zero-based index `n` fail with a device error.
    pub fn fail_on_launch(mut self, n: usize) -> Self {
        self.fail_launch_at = Some(n);
        self
    }

    /// Value written by each launch before averaging.
    pub fn set_sample_value(&mut self, value: f32) {
        self.sample_value = value;
    }

    pub fn geometries(&self) -> &[ShapeKind] {
        &self.geometries
    }

    pub fn accelerations(&self) -> &[MockAccel] {
        &self.accelerations
    }

    pub fn acceleration(&self, handle: AccelHandle) -> Option<&MockAccel> {
        self.accelerations.get(handle.index())
    }

    pub fn binding(&self, name: &str) -> Option<&BufferData> {
        self.bindings.get(name)
    }

    /// How many times `name` was bound.
    pub fn bind_count(&self, name: &str) -> usize {
        self.bind_log.iter().filter(|n| n.as_str() == name).count()
    }

    pub fn launches(&self) -> &[LaunchRecord] {
        &self.launches
    }

    pub fn launch_count(&self) -> usize {
        self.launches.len()
    }

    pub fn frame_numbers(&self) -> Vec<u32> {
        self.launches.iter().map(|l| l.frame_number).collect()
    }

    pub fn resizes(&self) -> &[(u32, u32)] {
        &self.resizes
    }

    pub fn validations(&self) -> usize {
        self.validations
    }

    fn bound_uint(&self, name: &str) -> Option<u32> {
        match self.bindings.get(name) {
            Some(BufferData::Uint(v)) => Some(*v),
            _ => None,
        }
    }
}

impl Backend for MockBackend {
    fn create_geometry(&mut self, instance: &GeometryInstance) -> Result<GeometryHandle> {
        self.geometries.push(instance.kind());
        Ok(GeometryHandle::from_raw(self.geometries.len() as u32 - 1))
    }

    fn create_acceleration(&mut self, input: AccelInput<'_>) -> Result<AccelHandle> {
        let accel = match input {
            AccelInput::Geometry(handles) => {
                if let Some(bad) = handles.iter().find(|h| h.index() >= self.geometries.len()) {
                    return Err(Error::device(format!("unknown geometry handle {bad:?}")));
                }
                MockAccel::Geometry(handles.to_vec())
            }
            AccelInput::Groups(handles) => {
                if let Some(bad) = handles.iter().find(|h| h.index() >= self.accelerations.len()) {
                    return Err(Error::device(format!("unknown acceleration handle {bad:?}")));
                }
                MockAccel::Groups(handles.to_vec())
            }
        };
        self.accelerations.push(accel);
        Ok(AccelHandle::from_raw(self.accelerations.len() as u32 - 1))
    }

    fn bind_buffer(&mut self, name: &str, data: BufferData) -> Result<()> {
        self.bind_log.push(name.to_string());
        self.bindings.insert(name.to_string(), data);
        Ok(())
    }

    fn resize_output(&mut self, width: u32, height: u32) -> Result<()> {
        self.resizes.push((width, height));
        self.output = OutputBuffer::new(width, height);
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.validations += 1;
        for name in [bindings::TOP_OBJECT, bindings::TOP_SHADOWER] {
            if !self.bindings.contains_key(name) {
                return Err(Error::device(format!("variable '{name}' is not bound")));
            }
        }
        Ok(())
    }

    fn launch(&mut self, width: u32, height: u32) -> Result<()> {
        if self.fail_launch_at == Some(self.launches.len()) {
            return Err(Error::device("simulated launch failure"));
        }
        if (width, height) != self.output.dimensions() {
            return Err(Error::device(format!(
                "launch {width}x{height} does not match output {:?}",
                self.output.dimensions()
            )));
        }
        let frame_number = match self.bound_uint(bindings::FRAME_NUMBER) {
            Some(n) if n > 0 => n,
            _ => return Err(Error::device("frame_number must be bound and non-zero")),
        };

        let weight = 1.0 / frame_number as f32;
        let sample = self.sample_value;
        for px in self.output.pixels_mut() {
            for c in px.iter_mut() {
                *c = if frame_number == 1 { sample } else { *c + (sample - *c) * weight };
            }
        }

        self.launches.push(LaunchRecord {
            width,
            height,
            frame_number,
        });
        if let Some(clock) = &self.clock {
            clock.advance(self.launch_cost);
        }
        Ok(())
    }

    fn output(&self) -> &OutputBuffer {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_requires_frame_number() {
        let mut mock = MockBackend::new();
        mock.resize_output(4, 4).unwrap();
        assert!(matches!(mock.launch(4, 4), Err(Error::Device(_))));

        mock.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(1)).unwrap();
        mock.launch(4, 4).unwrap();
        assert_eq!(mock.frame_numbers(), vec![1]);
    }

    #[test]
    fn test_launch_size_must_match_output() {
        let mut mock = MockBackend::new();
        mock.resize_output(4, 4).unwrap();
        mock.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(1)).unwrap();
        assert!(mock.launch(8, 4).is_err());
    }

    #[test]
    fn test_running_average() {
        let mut mock = MockBackend::new();
        mock.resize_output(1, 1).unwrap();
        mock.set_sample_value(1.0);
        mock.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(1)).unwrap();
        mock.launch(1, 1).unwrap();
        mock.set_sample_value(0.0);
        mock.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(2)).unwrap();
        mock.launch(1, 1).unwrap();
        assert!((mock.output().pixel(0, 0)[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_failure_injection() {
        let mut mock = MockBackend::new().fail_on_launch(1);
        mock.resize_output(1, 1).unwrap();
        mock.bind_buffer(bindings::FRAME_NUMBER, BufferData::Uint(1)).unwrap();
        assert!(mock.launch(1, 1).is_ok());
        assert!(matches!(mock.launch(1, 1), Err(Error::Device(_))));
        assert_eq!(mock.launch_count(), 1);
    }
}
