//! Built-in HLSL types and their GLSL ES 3.00 spellings.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Float,
    Int,
    Uint,
    Bool,
}

impl ScalarKind {
    fn glsl_vector_prefix(self) -> &'static str {
        match self {
            ScalarKind::Float => "vec",
            ScalarKind::Int => "ivec",
            ScalarKind::Uint => "uvec",
            ScalarKind::Bool => "bvec",
        }
    }

    fn glsl_scalar(self) -> &'static str {
        match self {
            ScalarKind::Float => "float",
            ScalarKind::Int => "int",
            ScalarKind::Uint => "uint",
            ScalarKind::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HlslType {
    Void,
    Scalar(ScalarKind),
    Vector(ScalarKind, u8),
    /// `rows` x `cols`, as written in HLSL (`float4x3` has 4 rows and 3 columns).
    Matrix {
        scalar: ScalarKind,
        rows: u8,
        cols: u8,
    },
    Struct(String),
}

impl HlslType {
    /// Resolves a built-in type name; user structs are resolved by the parser.
    pub fn builtin(name: &str) -> Option<HlslType> {
        let (scalar, rest) = split_scalar_prefix(name)?;
        if rest.is_empty() {
            return Some(HlslType::Scalar(scalar));
        }

        let dims = rest.as_bytes();
        let dim = |b: u8| (b'1'..=b'4').contains(&b).then(|| b - b'0');
        match dims {
            [n] => {
                let n = dim(*n)?;
                Some(if n == 1 {
                    HlslType::Scalar(scalar)
                } else {
                    HlslType::Vector(scalar, n)
                })
            }
            [r, b'x', c] => Some(HlslType::Matrix {
                scalar,
                rows: dim(*r)?,
                cols: dim(*c)?,
            }),
            _ => None,
        }
    }

    /// Resolves the `matrix` / `vector` shorthands and every numeric built-in.
    pub fn builtin_or_shorthand(name: &str) -> Option<HlslType> {
        match name {
            "void" => Some(HlslType::Void),
            "matrix" => Some(HlslType::Matrix {
                scalar: ScalarKind::Float,
                rows: 4,
                cols: 4,
            }),
            "vector" => Some(HlslType::Vector(ScalarKind::Float, 4)),
            _ => HlslType::builtin(name),
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            HlslType::Scalar(s) | HlslType::Vector(s, _) => Some(*s),
            HlslType::Matrix { scalar, .. } => Some(*scalar),
            HlslType::Void | HlslType::Struct(_) => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.scalar_kind(), Some(ScalarKind::Int | ScalarKind::Uint))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, HlslType::Matrix { .. })
    }

    /// GLSL spelling, or `None` for types GLSL ES cannot express (non-float matrices).
    ///
    /// HLSL `floatRxC` (R rows, C columns) becomes GLSL `matCxR` (C columns of R components):
    /// both describe the same mathematical matrix, so `mul(a, b)` maps onto `a * b` unchanged.
    pub fn glsl_name(&self, struct_name: impl Fn(&str) -> String) -> Option<String> {
        Some(match self {
            HlslType::Void => "void".to_string(),
            HlslType::Scalar(s) => s.glsl_scalar().to_string(),
            HlslType::Vector(s, n) => format!("{}{n}", s.glsl_vector_prefix()),
            HlslType::Matrix { scalar, rows, cols } => {
                if *scalar != ScalarKind::Float {
                    return None;
                }
                if rows == cols {
                    format!("mat{rows}")
                } else {
                    format!("mat{cols}x{rows}")
                }
            }
            HlslType::Struct(name) => struct_name(name),
        })
    }

    /// A GLSL expression producing the zero value of this type.
    pub fn glsl_zero(&self, glsl_name: &str) -> String {
        match self {
            HlslType::Scalar(ScalarKind::Float) => "0.0".to_string(),
            HlslType::Scalar(ScalarKind::Int) => "0".to_string(),
            HlslType::Scalar(ScalarKind::Uint) => "0u".to_string(),
            HlslType::Scalar(ScalarKind::Bool) => "false".to_string(),
            HlslType::Vector(ScalarKind::Float, _) | HlslType::Matrix { .. } => {
                format!("{glsl_name}(0.0)")
            }
            HlslType::Vector(ScalarKind::Int, _) => format!("{glsl_name}(0)"),
            HlslType::Vector(ScalarKind::Uint, _) => format!("{glsl_name}(0u)"),
            HlslType::Vector(ScalarKind::Bool, _) => format!("{glsl_name}(false)"),
            HlslType::Struct(_) => format!("xc_zero_{glsl_name}()"),
            HlslType::Void => String::new(),
        }
    }

    /// Size and alignment under std140 rules, in bytes.
    ///
    /// `row_major` only matters for matrices: each row (instead of each column) occupies a
    /// 16-byte aligned slot.
    pub fn std140_size_align(
        &self,
        row_major: bool,
        struct_layout: &dyn Fn(&str) -> (u32, u32),
    ) -> (u32, u32) {
        match self {
            HlslType::Void => (0, 0),
            HlslType::Scalar(_) => (4, 4),
            HlslType::Vector(_, 2) => (8, 8),
            HlslType::Vector(_, 3) => (12, 16),
            HlslType::Vector(_, _) => (16, 16),
            HlslType::Matrix { rows, cols, .. } => {
                let slots = if row_major { *rows } else { *cols };
                (u32::from(slots) * 16, 16)
            }
            HlslType::Struct(name) => struct_layout(name),
        }
    }
}

fn split_scalar_prefix(name: &str) -> Option<(ScalarKind, &str)> {
    const PREFIXES: &[(&str, ScalarKind)] = &[
        ("min16float", ScalarKind::Float),
        ("min10float", ScalarKind::Float),
        ("min16int", ScalarKind::Int),
        ("min16uint", ScalarKind::Uint),
        ("double", ScalarKind::Float),
        ("float", ScalarKind::Float),
        ("half", ScalarKind::Float),
        ("dword", ScalarKind::Uint),
        ("uint", ScalarKind::Uint),
        ("bool", ScalarKind::Bool),
        ("int", ScalarKind::Int),
    ];
    PREFIXES
        .iter()
        .find_map(|(prefix, kind)| name.strip_prefix(prefix).map(|rest| (*kind, rest)))
}

pub(crate) fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glsl(name: &str) -> String {
        HlslType::builtin_or_shorthand(name)
            .and_then(|t| t.glsl_name(|s| s.to_string()))
            .unwrap()
    }

    #[test]
    fn vectors_and_scalars_map_to_glsl() {
        assert_eq!(glsl("float"), "float");
        assert_eq!(glsl("half3"), "vec3");
        assert_eq!(glsl("int2"), "ivec2");
        assert_eq!(glsl("uint4"), "uvec4");
        assert_eq!(glsl("bool3"), "bvec3");
        assert_eq!(glsl("float1"), "float");
        assert_eq!(glsl("vector"), "vec4");
    }

    #[test]
    fn matrices_swap_row_and_column_counts() {
        assert_eq!(glsl("float4x4"), "mat4");
        assert_eq!(glsl("matrix"), "mat4");
        assert_eq!(glsl("float4x3"), "mat3x4");
        assert_eq!(glsl("float2x3"), "mat3x2");
    }

    #[test]
    fn non_types_are_rejected() {
        assert_eq!(HlslType::builtin("floaty"), None);
        assert_eq!(HlslType::builtin("float5"), None);
        assert_eq!(HlslType::builtin("interp"), None);
        assert!(HlslType::builtin("int4x4")
            .unwrap()
            .glsl_name(|s| s.to_string())
            .is_none());
    }

    #[test]
    fn std140_matrix_layout_follows_majorness() {
        let m = HlslType::builtin("float4x3").unwrap();
        let none = |_: &str| (0, 0);
        assert_eq!(m.std140_size_align(false, &none), (48, 16));
        assert_eq!(m.std140_size_align(true, &none), (64, 16));
    }
}
