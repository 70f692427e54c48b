//! Wavefront OBJ loader
//!
//! Reads `v`, `vt`, `vn` and `f` records. Polygons are fan-triangulated, negative
//! (relative) indices are resolved, and identical position/texcoord pairs share one
//! vertex. Texture `v` is flipped so the origin is the top-left of the image, and
//! every vertex is white. Normals are checked but not stored; the vertex format has no
//! normal attribute.

use std::collections::HashMap;
use std::path::Path;

use crate::assets::AssetError;
use crate::render::mesh::{MeshData, Vertex};

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

fn resolve_index(token: &str, count: usize, kind: &str) -> Result<usize, String> {
    let raw: i64 = token
        .parse()
        .map_err(|_| format!("invalid {kind} index '{token}'"))?;

    let resolved = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(count as i64 + r).ok(),
    };

    resolved
        .filter(|&i| i < count)
        .ok_or_else(|| format!("{kind} index {raw} out of range ({count} defined)"))
}

fn parse_floats<const N: usize>(parts: &[&str], kind: &str) -> Result<[f32; N], String> {
    if parts.len() < N {
        return Err(format!("{kind} needs {N} components, found {}", parts.len()));
    }
    let mut out = [0.0; N];
    for (slot, token) in out.iter_mut().zip(parts) {
        *slot = token
            .parse()
            .map_err(|_| format!("invalid {kind} component '{token}'"))?;
    }
    Ok(out)
}

impl MeshData {
    /// Load and triangulate an OBJ file
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mesh = Self::parse_obj(&source, path)?;
        log::info!(
            "Loaded mesh {:?}: {} vertices, {} triangles",
            path,
            mesh.vertices.len(),
            mesh.indices.len() / 3
        );
        Ok(mesh)
    }

    /// Parse OBJ text; `path` is only used in error reports
    pub fn parse_obj(source: &str, path: &Path) -> Result<Self, AssetError> {
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut normal_count = 0usize;
        let mut unique: HashMap<(usize, Option<usize>), u32> = HashMap::new();
        let mut mesh = Self::default();

        for (line_index, line) in source.lines().enumerate() {
            let parse_error = |reason: String| AssetError::Parse {
                path: path.to_path_buf(),
                line: line_index + 1,
                reason,
            };

            let line = line.split('#').next().unwrap_or("").trim();
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let args: Vec<&str> = parts.collect();

            match keyword {
                "v" => positions.push(parse_floats::<3>(&args, "position").map_err(parse_error)?),
                "vt" => {
                    let [u, v] = parse_floats::<2>(&args, "texcoord").map_err(parse_error)?;
                    tex_coords.push([u, 1.0 - v]);
                }
                "vn" => {
                    parse_floats::<3>(&args, "normal").map_err(parse_error)?;
                    normal_count += 1;
                }
                "f" => {
                    if args.len() < 3 {
                        return Err(parse_error(format!("face needs 3 vertices, found {}", args.len())));
                    }

                    let mut corners = Vec::with_capacity(args.len());
                    for corner in &args {
                        let mut fields = corner.split('/');
                        let position = resolve_index(fields.next().unwrap_or(""), positions.len(), "position")
                            .map_err(parse_error)?;
                        let tex_coord = match fields.next() {
                            Some(token) if !token.is_empty() => {
                                Some(resolve_index(token, tex_coords.len(), "texcoord").map_err(parse_error)?)
                            }
                            _ => None,
                        };
                        if let Some(token) = fields.next().filter(|token| !token.is_empty()) {
                            resolve_index(token, normal_count, "normal").map_err(parse_error)?;
                        }

                        let index = *unique.entry((position, tex_coord)).or_insert_with(|| {
                            mesh.vertices.push(Vertex::new(
                                positions[position],
                                WHITE,
                                tex_coord.map_or([0.0, 0.0], |t| tex_coords[t]),
                            ));
                            (mesh.vertices.len() - 1) as u32
                        });
                        corners.push(index);
                    }

                    for i in 1..corners.len() - 1 {
                        mesh.indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if mesh.indices.is_empty() {
            return Err(AssetError::LoadFailed(format!("{}: no faces found", path.display())));
        }
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parse(source: &str) -> Result<MeshData, AssetError> {
        MeshData::parse_obj(source, Path::new("test.obj"))
    }

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn test_quad_fan_triangulated() {
        let mesh = parse(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_texcoord_v_flipped_and_color_white() {
        let mesh = parse(QUAD).unwrap();
        assert_relative_eq!(mesh.vertices[0].tex_coord[1], 1.0);
        assert_relative_eq!(mesh.vertices[2].tex_coord[1], 0.0);
        assert!(mesh.vertices.iter().all(|v| v.color == WHITE));
    }

    #[test]
    fn test_negative_indices() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shared_corners_deduplicated() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3\n";
        let mesh = parse(source).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn test_normals_and_unknown_records_accepted() {
        let source = "o thing\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\ns off\nf 1//1 2//1 3//-1\n";
        let mesh = parse(source).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_range_normal_index_rejected() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//2\n";
        match parse(source).unwrap_err() {
            AssetError::Parse { line, reason, .. } => {
                assert_eq!(line, 5);
                assert!(reason.contains("normal"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_malformed_normal_rejected() {
        assert!(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 1\nf 1 2 3\n").is_err());
    }

    #[test]
    fn test_out_of_range_index_reports_line() {
        let err = parse("v 0 0 0\nf 1 2 3\n").unwrap_err();
        match err {
            AssetError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_malformed_number_rejected() {
        assert!(parse("v 0 zero 0\n").is_err());
        assert!(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n").is_err());
    }

    #[test]
    fn test_empty_mesh_rejected() {
        assert!(matches!(parse("v 0 0 0\n"), Err(AssetError::LoadFailed(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            MeshData::load_obj("no/such/mesh.obj"),
            Err(AssetError::Io { .. })
        ));
    }
}
