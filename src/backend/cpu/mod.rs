//! Software execution backend.
//!
//! ## Architecture
//! ```text
//! create_geometry ─► CpuGeometry (mesh triangles get their own BVH)
//! create_acceleration ─► SAH BVH over member bounds
//! launch ─► rayon rows ─► path trace ─► running average in OutputBuffer
//! ```

pub mod bvh;
pub mod integrator;
pub mod shapes;

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use self::bvh::Bvh;
use self::integrator::{LaunchParams, SceneView};
use self::shapes::MeshAccel;
use super::{bindings, AccelHandle, AccelInput, Backend, BufferData, GeometryHandle, OutputBuffer};
use crate::light::LIGHT_PARAMETER_STRIDE;
use crate::scene::{GeometryInstance, Shape};
use crate::util::{Aabb, Error, Result, Vec3};

/// Geometry as stored by the CPU backend.
#[derive(Debug)]
pub struct CpuGeometry {
    shape: CpuShape,
    bounds: Aabb,
    /// Albedo, or emission for emitters
    color: Vec3,
    emissive: bool,
}

#[derive(Debug)]
enum CpuShape {
    Volume { center: Vec3, local_scale: Vec3 },
    Sphere { center: Vec3, radius: f32 },
    Mesh(Arc<MeshAccel>),
}

/// Acceleration structure over geometries or child structures.
#[derive(Debug)]
pub enum CpuAccel {
    Geometry { members: Vec<GeometryHandle>, bvh: Bvh },
    Groups { children: Vec<AccelHandle>, bvh: Bvh },
}

impl CpuAccel {
    fn bounds(&self) -> Aabb {
        match self {
            CpuAccel::Geometry { bvh, .. } | CpuAccel::Groups { bvh, .. } => bvh.bounds(),
        }
    }
}

/// Rayon-parallel software ray tracer.
#[derive(Debug, Default)]
pub struct CpuBackend {
    geometries: Vec<CpuGeometry>,
    accels: Vec<CpuAccel>,
    bindings: HashMap<String, BufferData>,
    output: OutputBuffer,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn accel_binding(&self, name: &str) -> Result<AccelHandle> {
        match self.bindings.get(name) {
            Some(BufferData::Accel(h)) if h.index() < self.accels.len() => Ok(*h),
            Some(BufferData::Accel(h)) => Err(Error::device(format!("'{name}' refers to unknown acceleration {h:?}"))),
            Some(other) => Err(Error::device(format!("'{name}' must be an acceleration, got {other:?}"))),
            None => Err(Error::device(format!("variable '{name}' is not bound"))),
        }
    }

    fn uint_binding(&self, name: &str, default: u32) -> Result<u32> {
        match self.bindings.get(name) {
            Some(BufferData::Uint(v)) => Ok(*v),
            Some(BufferData::Int(v)) if *v >= 0 => Ok(*v as u32),
            None => Ok(default),
            Some(other) => Err(Error::device(format!("'{name}' must be an unsigned integer, got {other:?}"))),
        }
    }

    fn float_binding(&self, name: &str, default: f32) -> Result<f32> {
        match self.bindings.get(name) {
            Some(BufferData::Float(v)) => Ok(*v),
            None => Ok(default),
            Some(other) => Err(Error::device(format!("'{name}' must be a float, got {other:?}"))),
        }
    }

    fn light_buffer(&self) -> Result<(&[u8], usize)> {
        let count = match self.bindings.get(bindings::NUMBER_OF_LIGHTS) {
            Some(BufferData::Int(n)) if *n >= 0 => *n as usize,
            None => 0,
            Some(other) => return Err(Error::device(format!("invalid light count {other:?}"))),
        };
        match self.bindings.get(bindings::LIGHT_PARAMETERS) {
            Some(BufferData::Records { bytes, stride, .. }) => {
                if *stride != LIGHT_PARAMETER_STRIDE {
                    return Err(Error::device(format!(
                        "light stride {stride} does not match {LIGHT_PARAMETER_STRIDE}"
                    )));
                }
                if bytes.len() < count * stride {
                    return Err(Error::device(format!(
                        "light buffer holds {} byte(s), {count} light(s) need {}",
                        bytes.len(),
                        count * stride
                    )));
                }
                Ok((bytes.as_slice(), count))
            }
            None if count == 0 => Ok((&[], 0)),
            _ => Err(Error::device("light parameters are not bound")),
        }
    }

    fn launch_params(&self) -> Result<LaunchParams> {
        let camera = match self.bindings.get(bindings::CAMERA) {
            Some(BufferData::Camera(c)) => *c,
            _ => return Err(Error::device("camera is not bound")),
        };
        let frame_number = self.uint_binding(bindings::FRAME_NUMBER, 0)?;
        if frame_number == 0 {
            return Err(Error::device("frame_number must be bound and non-zero"));
        }
        let (_, light_count) = self.light_buffer()?;
        Ok(LaunchParams {
            camera,
            frame_number,
            top_object: self.accel_binding(bindings::TOP_OBJECT)?,
            top_shadower: self.accel_binding(bindings::TOP_SHADOWER)?,
            max_depth: self.uint_binding(bindings::MAX_DEPTH, 10)?,
            sample_per_launch: self.uint_binding(bindings::SAMPLE_PER_LAUNCH, 1)?,
            rr_begin_depth: self.uint_binding(bindings::RR_BEGIN_DEPTH, 1)?,
            scene_epsilon: self.float_binding(bindings::SCENE_EPSILON, 1e-3)?,
            light_count,
        })
    }

    /// One progressive pass into `output`.
    fn render_into(&self, output: &mut OutputBuffer) -> Result<()> {
        let (width, height) = output.dimensions();
        let params = self.launch_params()?;
        let (lights, _) = self.light_buffer()?;
        let environment = match self.bindings.get(bindings::ENVMAP) {
            Some(BufferData::Environment(env)) => Some(env.as_ref()),
            _ => None,
        };
        let view = SceneView {
            geometries: &self.geometries,
            accels: &self.accels,
            lights,
            environment,
            params,
        };

        let frame = params.frame_number;
        let weight = 1.0 / frame as f32;
        output
            .pixels_mut()
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let sample = view.shade_pixel(x as u32, y as u32, width, height);
                    if frame == 1 {
                        *out = sample;
                    } else {
                        for c in 0..4 {
                            out[c] += (sample[c] - out[c]) * weight;
                        }
                    }
                }
            });
        Ok(())
    }
}

impl Backend for CpuBackend {
    fn create_geometry(&mut self, instance: &GeometryInstance) -> Result<GeometryHandle> {
        let shape = match instance.shape() {
            Shape::RaymarchedVolume { center, local_scale } => CpuShape::Volume {
                center: *center,
                local_scale: *local_scale,
            },
            Shape::Sphere { center, radius } => CpuShape::Sphere {
                center: *center,
                radius: *radius,
            },
            Shape::TriangleMesh(mesh) => CpuShape::Mesh(Arc::new(MeshAccel::build(Arc::clone(mesh)))),
        };
        self.geometries.push(CpuGeometry {
            shape,
            bounds: instance.bounds(),
            color: instance.material().color,
            emissive: instance.is_emissive(),
        });
        Ok(GeometryHandle::from_raw(self.geometries.len() as u32 - 1))
    }

    #[tracing::instrument(skip_all, fields(len = input.len()))]
    fn create_acceleration(&mut self, input: AccelInput<'_>) -> Result<AccelHandle> {
        let accel = match input {
            AccelInput::Geometry(members) => {
                let bounds = members
                    .iter()
                    .map(|h| {
                        self.geometries
                            .get(h.index())
                            .map(|g| g.bounds)
                            .ok_or_else(|| Error::device(format!("unknown geometry handle {h:?}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                CpuAccel::Geometry {
                    members: members.to_vec(),
                    bvh: Bvh::build(&bounds),
                }
            }
            AccelInput::Groups(children) => {
                let bounds = children
                    .iter()
                    .map(|h| {
                        self.accels
                            .get(h.index())
                            .map(CpuAccel::bounds)
                            .ok_or_else(|| Error::device(format!("unknown acceleration handle {h:?}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                CpuAccel::Groups {
                    children: children.to_vec(),
                    bvh: Bvh::build(&bounds),
                }
            }
        };
        self.accels.push(accel);
        Ok(AccelHandle::from_raw(self.accels.len() as u32 - 1))
    }

    fn bind_buffer(&mut self, name: &str, data: BufferData) -> Result<()> {
        self.bindings.insert(name.to_string(), data);
        Ok(())
    }

    fn resize_output(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::device(format!("invalid output size {width}x{height}")));
        }
        self.output = OutputBuffer::new(width, height);
        log::debug!("output buffer {width}x{height}");
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.accel_binding(bindings::TOP_OBJECT)?;
        self.accel_binding(bindings::TOP_SHADOWER)?;
        self.light_buffer()?;
        if let Some(BufferData::Environment(_)) | None = self.bindings.get(bindings::ENVMAP) {
            Ok(())
        } else {
            Err(Error::device("'envmap' must be an environment map"))
        }
    }

    #[tracing::instrument(skip(self))]
    fn launch(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) != self.output.dimensions() {
            return Err(Error::device(format!(
                "launch {width}x{height} does not match output {:?}",
                self.output.dimensions()
            )));
        }
        let mut output = std::mem::take(&mut self.output);
        let result = self.render_into(&mut output);
        self.output = output;
        result
    }

    fn output(&self) -> &OutputBuffer {
        &self.output
    }
}
