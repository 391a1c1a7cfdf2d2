use bytemuck::{Pod, Zeroable};

/// Vertex of a textured mesh as the mesh shader reads it from a structured
/// buffer. 32 bytes; the trailing pad keeps the stride a multiple of 16.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 4],
    pub uv: [f32; 2],
    pub pad: [f32; 2],
}

impl MeshVertex {
    const fn new(x: f32, y: f32, z: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, z, 1.0],
            uv: [u, v],
            pad: [0.0; 2],
        }
    }
}

/// Unit cube centered at the origin as a 36-vertex triangle list,
/// counter-clockwise when seen from outside.
pub fn cube() -> Vec<MeshVertex> {
    // +X, -X, +Y, -Y, +Z, -Z
    const FACES: [[[f32; 3]; 4]; 6] = [
        [[1.0, -1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [1.0, 1.0, 1.0]],
        [[-1.0, -1.0, -1.0], [-1.0, -1.0, 1.0], [-1.0, 1.0, 1.0], [-1.0, 1.0, -1.0]],
        [[-1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0]],
        [[-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, -1.0, 1.0], [-1.0, -1.0, 1.0]],
        [[-1.0, -1.0, 1.0], [1.0, -1.0, 1.0], [1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]],
        [[1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0, 1.0, -1.0], [1.0, 1.0, -1.0]],
    ];
    const UVS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    let mut out = Vec::with_capacity(36);
    for face in FACES {
        for i in [0, 1, 2, 0, 2, 3] {
            let [x, y, z] = face[i].map(|c| c * 0.5);
            let [u, v] = UVS[i];
            out.push(MeshVertex::new(x, y, z, u, v));
        }
    }
    out
}

/// Tightly packed RGBA8 checkerboard, `size` texels square with `cells` cells per edge.
pub fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut out = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let texel = if (x / cell + y / cell) % 2 == 0 { a } else { b };
            out.extend_from_slice(&texel);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn mesh_vertex_is_32_bytes() {
        assert_eq!(size_of::<MeshVertex>(), 32);
    }

    #[test]
    fn cube_faces_point_outward() {
        let verts = cube();
        assert_eq!(verts.len(), 36);
        for tri in verts.chunks(3) {
            let p: Vec<Vec3> = tri
                .iter()
                .map(|v| Vec3::new(v.position[0], v.position[1], v.position[2]))
                .collect();
            let normal = (p[1] - p[0]).cross(p[2] - p[0]);
            let center = (p[0] + p[1] + p[2]) / 3.0;
            assert!(normal.dot(center) > 0.0, "inward triangle {p:?}");
        }
    }

    #[test]
    fn checker_alternates_cells() {
        let white = [255; 4];
        let black = [0, 0, 0, 255];
        let data = checker(4, 2, white, black);
        assert_eq!(data.len(), 64);
        assert_eq!(&data[0..4], &white);
        assert_eq!(&data[8..12], &black);
        // Second row of cells starts with the other color.
        let row2 = (2 * 4 * 4) as usize;
        assert_eq!(&data[row2..row2 + 4], &black);
    }
}
