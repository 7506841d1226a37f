//! Semantic model produced by the parser.
//!
//! Declarations are kept as typed records; function bodies stay as token ranges into
//! [`HlslModule::tokens`] because the GLSL generator re-walks them directly.

use std::ops::Range;

use crate::error::HlslError;
use crate::token::Token;
use crate::types::HlslType;

/// Register value of a resource that has not been assigned one yet.
pub const UNASSIGNED_REGISTER: i32 = -1;

/// Name of the implicit constant buffer collecting loose global variables.
pub const GLOBAL_CBUFFER_NAME: &str = "$Global";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// Tag carried by generated uniform names so blocks and samplers never merge across stages
    /// at link time.
    pub fn tag(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs",
            ShaderStage::Pixel => "ps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationModifier {
    Linear,
    Centroid,
    NoInterpolation,
    NoPerspective,
    Sample,
}

impl InterpolationModifier {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "linear" => Self::Linear,
            "centroid" => Self::Centroid,
            "nointerpolation" => Self::NoInterpolation,
            "noperspective" => Self::NoPerspective,
            "sample" => Self::Sample,
            _ => return None,
        })
    }
}

/// `TEXCOORD3` is stored as name `TEXCOORD`, index 3. Names are upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Semantic {
    pub name: String,
    pub index: u32,
}

impl Semantic {
    pub fn parse(raw: &str, line: u32) -> Result<Self, HlslError> {
        let digits = raw.len() - raw.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (name, index) = raw.split_at(raw.len() - digits);
        let index = if index.is_empty() {
            0
        } else {
            index.parse().map_err(|_| HlslError::UnsupportedSemantic {
                line,
                semantic: raw.to_string(),
                reason: "semantic index is out of range",
            })?
        };
        Ok(Self {
            name: name.to_ascii_uppercase(),
            index,
        })
    }

    pub fn is_system_value(&self) -> bool {
        self.name.starts_with("SV_")
    }
}

impl std::fmt::Display for Semantic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub ty: HlslType,
    pub name: String,
    pub array_size: Option<u32>,
    pub interpolation: Option<InterpolationModifier>,
    pub semantic: Option<Semantic>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixLayout {
    RowMajor,
    ColumnMajor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub ty: HlslType,
    pub name: String,
    pub array_size: Option<u32>,
    pub matrix_layout: Option<MatrixLayout>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBuffer {
    pub name: String,
    /// Explicit `register(bN)` or [`UNASSIGNED_REGISTER`] until resolution.
    pub register: i32,
    pub variables: Vec<Variable>,
    pub line: u32,
}

impl ConstantBuffer {
    pub fn is_implicit_global(&self) -> bool {
        self.name == GLOBAL_CBUFFER_NAME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureType {
    Texture1D,
    Texture2D,
    Texture2DArray,
    Texture3D,
    TextureCube,
}

impl TextureType {
    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "Texture1D" => Self::Texture1D,
            "Texture2D" => Self::Texture2D,
            "Texture2DArray" => Self::Texture2DArray,
            "Texture3D" => Self::Texture3D,
            "TextureCube" => Self::TextureCube,
            _ => return None,
        })
    }

    /// GLSL sampler type. One-dimensional textures are backed by 2D textures of height 1.
    pub fn glsl_sampler(self) -> &'static str {
        match self {
            TextureType::Texture1D | TextureType::Texture2D => "sampler2D",
            TextureType::Texture2DArray => "sampler2DArray",
            TextureType::Texture3D => "sampler3D",
            TextureType::TextureCube => "samplerCube",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDecl {
    pub name: String,
    pub ty: TextureType,
    /// Template argument (`Texture2D<float2>`); `None` means `float4`.
    pub element: Option<HlslType>,
    pub register: i32,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDecl {
    pub name: String,
    pub register: i32,
    pub line: u32,
}

/// `static` / `const` globals; these stay shader-private instead of joining `$Global`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGlobal {
    pub is_const: bool,
    pub ty: HlslType,
    pub name: String,
    pub array_size: Option<u32>,
    pub initializer: Option<Range<usize>>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub direction: ParamDirection,
    pub interpolation: Option<InterpolationModifier>,
    pub ty: HlslType,
    pub name: String,
    pub array_size: Option<u32>,
    pub semantic: Option<Semantic>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub return_type: HlslType,
    pub return_semantic: Option<Semantic>,
    pub name: String,
    pub params: Vec<Parameter>,
    /// Tokens strictly between the body braces; `None` for a prototype.
    pub body: Option<Range<usize>>,
    pub line: u32,
}

/// Top-level declarations in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Struct(usize),
    ConstantBuffer(usize),
    Static(usize),
    Function(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlslModule {
    pub stage: ShaderStage,
    pub tokens: Vec<Token>,
    pub structs: Vec<StructDecl>,
    pub constant_buffers: Vec<ConstantBuffer>,
    pub textures: Vec<TextureDecl>,
    pub samplers: Vec<SamplerDecl>,
    pub statics: Vec<StaticGlobal>,
    pub functions: Vec<Function>,
    pub items: Vec<Item>,
    /// Index into [`HlslModule::functions`] of the entry point.
    pub main: usize,
}

impl HlslModule {
    pub fn entry(&self) -> &Function {
        &self.functions[self.main]
    }

    pub fn struct_decl(&self, name: &str) -> Option<&StructDecl> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureDecl> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn sampler(&self, name: &str) -> Option<&SamplerDecl> {
        self.samplers.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_splits_trailing_index() {
        assert_eq!(
            Semantic::parse("TexCoord3", 1).unwrap(),
            Semantic {
                name: "TEXCOORD".into(),
                index: 3
            }
        );
        assert_eq!(Semantic::parse("SV_Position", 1).unwrap().index, 0);
        assert!(Semantic::parse("SV_Target1", 1).unwrap().is_system_value());
    }

    #[test]
    fn overflowing_semantic_index_is_rejected() {
        let err = Semantic::parse("TEXCOORD99999999999", 7).unwrap_err();
        assert_eq!(
            err,
            HlslError::UnsupportedSemantic {
                line: 7,
                semantic: "TEXCOORD99999999999".into(),
                reason: "semantic index is out of range",
            }
        );
    }
}
