use crate::desc::PrimitiveTopology;
use crate::error::{D3dError, Result};
use crate::gl;

/// Backend draw mode for `topology`. Adjacency and patch topologies only feed geometry and
/// tessellation stages, which the backend lacks.
pub fn translate_topology(topology: PrimitiveTopology) -> Result<u32> {
    match topology {
        PrimitiveTopology::PointList => Ok(gl::POINTS),
        PrimitiveTopology::LineList => Ok(gl::LINES),
        PrimitiveTopology::LineStrip => Ok(gl::LINE_STRIP),
        PrimitiveTopology::TriangleList => Ok(gl::TRIANGLES),
        PrimitiveTopology::TriangleStrip => Ok(gl::TRIANGLE_STRIP),
        other => Err(D3dError::UnsupportedTopology(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_and_strip_topologies_translate() {
        assert_eq!(translate_topology(PrimitiveTopology::TriangleList).unwrap(), gl::TRIANGLES);
        assert_eq!(translate_topology(PrimitiveTopology::LineStrip).unwrap(), gl::LINE_STRIP);
    }

    #[test]
    fn adjacency_patches_and_undefined_are_rejected() {
        for topology in [
            PrimitiveTopology::Undefined,
            PrimitiveTopology::TriangleListAdj,
            PrimitiveTopology::ControlPointPatchList(3),
        ] {
            assert!(matches!(
                translate_topology(topology),
                Err(D3dError::UnsupportedTopology(_))
            ));
        }
    }
}
