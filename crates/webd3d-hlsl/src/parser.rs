//! Single-pass recursive-descent parser for the HLSL subset.
//!
//! Top-level declarations are dispatched on their leading keyword. Anything else is parsed as a
//! type followed by an identifier: a `(` makes it a function, otherwise it is a global variable
//! that joins the implicit `$Global` constant buffer (or stays shader-private when declared
//! `static`/`const`).

use tracing::debug;

use crate::ast::{
    ConstantBuffer, Function, HlslModule, InterpolationModifier, Item, MatrixLayout,
    ParamDirection, Parameter, SamplerDecl, Semantic, ShaderStage, StaticGlobal, StructDecl,
    StructField, TextureDecl, TextureType, Variable, GLOBAL_CBUFFER_NAME, UNASSIGNED_REGISTER,
};
use crate::error::HlslError;
use crate::registers::resolve_registers;
use crate::token::{Token, TokenKind};
use crate::types::{HlslType, ScalarKind};

/// Resource types the backend has no equivalent for.
const UNSUPPORTED_RESOURCE_TYPES: &[&str] = &[
    "Buffer",
    "StructuredBuffer",
    "ByteAddressBuffer",
    "AppendStructuredBuffer",
    "ConsumeStructuredBuffer",
    "Texture1DArray",
    "Texture2DMS",
    "Texture2DMSArray",
    "TextureCubeArray",
];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "tbuffer",
    "typedef",
    "namespace",
    "interface",
    "class",
    "groupshared",
    "technique",
    "technique10",
    "technique11",
];

/// Parses a token stream into a module and resolves its registers.
pub fn parse(tokens: Vec<Token>, stage: ShaderStage) -> Result<HlslModule, HlslError> {
    Parser::new(tokens, stage).parse_module()
}

struct Parser {
    stage: ShaderStage,
    tokens: Vec<Token>,
    pos: usize,
    structs: Vec<StructDecl>,
    constant_buffers: Vec<ConstantBuffer>,
    textures: Vec<TextureDecl>,
    samplers: Vec<SamplerDecl>,
    statics: Vec<StaticGlobal>,
    functions: Vec<Function>,
    items: Vec<Item>,
}

impl Parser {
    fn new(tokens: Vec<Token>, stage: ShaderStage) -> Self {
        Self {
            stage,
            tokens,
            pos: 0,
            structs: Vec::new(),
            constant_buffers: Vec::new(),
            textures: Vec::new(),
            samplers: Vec::new(),
            statics: Vec::new(),
            functions: Vec::new(),
            items: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_text(&self, ahead: usize) -> &str {
        self.tokens
            .get(self.pos + ahead)
            .map_or("", |t| t.text.as_str())
    }

    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn found(&self) -> String {
        self.peek()
            .map_or_else(|| "end of input".to_string(), |t| format!("`{}`", t.text))
    }

    fn error(&self, expected: impl Into<String>) -> HlslError {
        HlslError::Parse {
            line: self.line(),
            expected: expected.into(),
            found: self.found(),
        }
    }

    fn allow(&mut self, text: &str) -> bool {
        if self.peek().is_some_and(|t| t.is(text)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn require(&mut self, text: &str) -> Result<(), HlslError> {
        if self.allow(text) {
            Ok(())
        } else {
            Err(self.error(format!("`{text}`")))
        }
    }

    fn require_identifier(&mut self) -> Result<(String, u32), HlslError> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Identifier => {
                let out = (t.text.clone(), t.line);
                self.pos += 1;
                Ok(out)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn require_u32(&mut self) -> Result<u32, HlslError> {
        let parsed = self.peek().and_then(|t| {
            if t.kind != TokenKind::Number {
                return None;
            }
            let text = t.text.trim_end_matches(['u', 'U', 'l', 'L']);
            match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => text.parse().ok(),
            }
        });
        match parsed {
            Some(value) => {
                self.pos += 1;
                Ok(value)
            }
            None => Err(self.error("integer literal")),
        }
    }

    fn parse_module(mut self) -> Result<HlslModule, HlslError> {
        while let Some(tok) = self.peek() {
            let line = tok.line;
            let word = tok.text.clone();
            match word.as_str() {
                ";" => self.pos += 1,
                "[" => self.skip_attribute()?,
                "struct" => self.parse_struct()?,
                "cbuffer" => self.parse_cbuffer()?,
                "SamplerState" | "sampler" => self.parse_sampler()?,
                "SamplerComparisonState" => {
                    return Err(HlslError::unsupported(line, "comparison samplers"));
                }
                w if TextureType::from_keyword(w).is_some() => self.parse_texture()?,
                w if UNSUPPORTED_KEYWORDS.contains(&w) => {
                    return Err(HlslError::unsupported(line, format!("`{w}` declarations")));
                }
                w if UNSUPPORTED_RESOURCE_TYPES.contains(&w) || w.starts_with("RW") => {
                    return Err(HlslError::unsupported(line, format!("`{w}` resources")));
                }
                _ => self.parse_global_or_function()?,
            }
        }
        self.finish()
    }

    /// Skips a bracketed attribute such as `[earlydepthstencil]`.
    fn skip_attribute(&mut self) -> Result<(), HlslError> {
        self.require("[")?;
        let (name, _) = self.require_identifier()?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                Some(t) if t.is("[") => depth += 1,
                Some(t) if t.is("]") => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("`]`")),
            }
            self.pos += 1;
        }
        debug!(attribute = %name, "ignoring top-level attribute");
        Ok(())
    }

    fn parse_type(&mut self) -> Result<HlslType, HlslError> {
        let (name, line) = self.require_identifier()?;
        if let Some(ty) = HlslType::builtin_or_shorthand(&name) {
            return Ok(ty);
        }
        if self.structs.iter().any(|s| s.name == name) {
            return Ok(HlslType::Struct(name));
        }
        Err(HlslError::UnknownType { line, name })
    }

    fn parse_value_type(&mut self) -> Result<HlslType, HlslError> {
        let line = self.line();
        let ty = self.parse_type()?;
        if ty == HlslType::Void {
            return Err(HlslError::UnknownType {
                line,
                name: "void".to_string(),
            });
        }
        Ok(ty)
    }

    fn parse_array_size(&mut self) -> Result<Option<u32>, HlslError> {
        if !self.allow("[") {
            return Ok(None);
        }
        let line = self.line();
        let size = self.require_u32()?;
        if size == 0 {
            return Err(HlslError::unsupported(line, "zero-sized arrays"));
        }
        self.require("]")?;
        if self.peek_text(0) == "[" {
            return Err(HlslError::unsupported(line, "multi-dimensional arrays"));
        }
        Ok(Some(size))
    }

    fn parse_semantic(&mut self) -> Result<Semantic, HlslError> {
        let (raw, line) = self.require_identifier()?;
        if raw == "register" || raw == "packoffset" {
            return Err(HlslError::unsupported(line, format!("`{raw}` in this position")));
        }
        Semantic::parse(&raw, line)
    }

    /// Parses `register(xN)` (the leading `:` has already been consumed).
    fn parse_register(&mut self, kind: char) -> Result<i32, HlslError> {
        let line = self.line();
        if self.peek_text(0) == "packoffset" {
            return Err(HlslError::unsupported(line, "packoffset"));
        }
        self.require("register")?;
        self.require("(")?;
        let (reg, reg_line) = self.require_identifier()?;
        let mut chars = reg.chars();
        let index = match (chars.next(), chars.as_str().parse::<u32>()) {
            (Some(k), Ok(index)) if k.to_ascii_lowercase() == kind => index,
            _ => {
                return Err(HlslError::Parse {
                    line: reg_line,
                    expected: format!("`{kind}` register"),
                    found: format!("`{reg}`"),
                })
            }
        };
        if self.allow(",") {
            let (space, space_line) = self.require_identifier()?;
            if space != "space0" {
                return Err(HlslError::unsupported(space_line, "register spaces"));
            }
        }
        self.require(")")?;
        i32::try_from(index).map_err(|_| HlslError::RegisterOutOfRange {
            line,
            kind,
            index,
            max: i32::MAX as u32,
        })
    }

    fn parse_interpolation(&mut self) -> Option<InterpolationModifier> {
        let mut found = None;
        while let Some(m) = InterpolationModifier::from_keyword(self.peek_text(0)) {
            found = Some(m);
            self.pos += 1;
        }
        found
    }

    fn parse_struct(&mut self) -> Result<(), HlslError> {
        self.require("struct")?;
        let (name, line) = self.require_identifier()?;
        if self.structs.iter().any(|s| s.name == name) {
            return Err(HlslError::unsupported(line, format!("redefinition of struct `{name}`")));
        }
        self.require("{")?;

        let mut fields = Vec::new();
        while !self.allow("}") {
            let interpolation = self.parse_interpolation();
            let ty = self.parse_value_type()?;
            loop {
                let (field_name, field_line) = self.require_identifier()?;
                let array_size = self.parse_array_size()?;
                let semantic = if self.allow(":") {
                    Some(self.parse_semantic()?)
                } else {
                    None
                };
                fields.push(StructField {
                    ty: ty.clone(),
                    name: field_name,
                    array_size,
                    interpolation,
                    semantic,
                    line: field_line,
                });
                if !self.allow(",") {
                    break;
                }
            }
            self.require(";")?;
        }
        self.require(";")?;

        self.items.push(Item::Struct(self.structs.len()));
        self.structs.push(StructDecl { name, fields, line });
        Ok(())
    }

    fn parse_cbuffer(&mut self) -> Result<(), HlslError> {
        self.require("cbuffer")?;
        let (name, line) = self.require_identifier()?;
        let register = if self.allow(":") {
            self.parse_register('b')?
        } else {
            UNASSIGNED_REGISTER
        };
        self.require("{")?;

        let mut variables = Vec::new();
        while !self.allow("}") {
            let mut matrix_layout = None;
            loop {
                match self.peek_text(0) {
                    "row_major" => matrix_layout = Some(MatrixLayout::RowMajor),
                    "column_major" => matrix_layout = Some(MatrixLayout::ColumnMajor),
                    "uniform" => {}
                    _ => break,
                }
                self.pos += 1;
            }
            let ty = self.parse_value_type()?;
            loop {
                let (var_name, var_line) = self.require_identifier()?;
                let array_size = self.parse_array_size()?;
                if self.allow(":") {
                    return Err(HlslError::unsupported(var_line, "packoffset"));
                }
                variables.push(Variable {
                    ty: ty.clone(),
                    name: var_name,
                    array_size,
                    matrix_layout,
                    line: var_line,
                });
                if !self.allow(",") {
                    break;
                }
            }
            self.require(";")?;
        }
        self.allow(";");

        self.items
            .push(Item::ConstantBuffer(self.constant_buffers.len()));
        self.constant_buffers.push(ConstantBuffer {
            name,
            register,
            variables,
            line,
        });
        Ok(())
    }

    fn parse_texture(&mut self) -> Result<(), HlslError> {
        let (keyword, _) = self.require_identifier()?;
        let Some(ty) = TextureType::from_keyword(&keyword) else {
            return Err(self.error("texture type"));
        };
        let mut element = None;
        if self.allow("<") {
            let line = self.line();
            let ty = self.parse_value_type()?;
            if !matches!(
                ty,
                HlslType::Scalar(ScalarKind::Float) | HlslType::Vector(ScalarKind::Float, _)
            ) {
                return Err(HlslError::unsupported(line, "non-float texture element types"));
            }
            self.require(">")?;
            element = Some(ty);
        }

        loop {
            let (name, line) = self.require_identifier()?;
            if self.peek_text(0) == "[" {
                return Err(HlslError::unsupported(line, "texture arrays"));
            }
            let register = if self.allow(":") {
                self.parse_register('t')?
            } else {
                UNASSIGNED_REGISTER
            };
            self.textures.push(TextureDecl {
                name,
                ty,
                element: element.clone(),
                register,
                line,
            });
            if !self.allow(",") {
                break;
            }
        }
        self.require(";")
    }

    fn parse_sampler(&mut self) -> Result<(), HlslError> {
        self.pos += 1;
        loop {
            let (name, line) = self.require_identifier()?;
            if self.peek_text(0) == "[" {
                return Err(HlslError::unsupported(line, "sampler arrays"));
            }
            let register = if self.allow(":") {
                self.parse_register('s')?
            } else {
                UNASSIGNED_REGISTER
            };
            if matches!(self.peek_text(0), "=" | "{") {
                return Err(HlslError::unsupported(line, "inline sampler state"));
            }
            self.samplers.push(SamplerDecl {
                name,
                register,
                line,
            });
            if !self.allow(",") {
                break;
            }
        }
        self.require(";")
    }

    fn parse_global_or_function(&mut self) -> Result<(), HlslError> {
        let mut is_static = false;
        let mut is_const = false;
        let mut matrix_layout = None;
        loop {
            match self.peek_text(0) {
                "static" => is_static = true,
                "const" => is_const = true,
                "row_major" => matrix_layout = Some(MatrixLayout::RowMajor),
                "column_major" => matrix_layout = Some(MatrixLayout::ColumnMajor),
                "uniform" | "extern" | "inline" | "precise" => {}
                _ => break,
            }
            self.pos += 1;
        }

        let ty = self.parse_type()?;
        let (name, line) = self.require_identifier()?;
        if self.peek_text(0) == "(" {
            return self.parse_function(ty, name, line);
        }
        if ty == HlslType::Void {
            return Err(HlslError::UnknownType {
                line,
                name: "void".to_string(),
            });
        }

        let mut name = name;
        let mut line = line;
        loop {
            let array_size = self.parse_array_size()?;
            if self.allow(":") {
                return Err(HlslError::unsupported(line, "register bindings on global variables"));
            }
            let initializer = if self.allow("=") {
                Some(self.skip_initializer()?)
            } else {
                None
            };

            if is_static || is_const {
                self.items.push(Item::Static(self.statics.len()));
                self.statics.push(StaticGlobal {
                    is_const,
                    ty: ty.clone(),
                    name,
                    array_size,
                    initializer,
                    line,
                });
            } else {
                if initializer.is_some() {
                    debug!(variable = %name, line, "ignoring default value of uniform global");
                }
                let cb = self.global_cbuffer(line);
                self.constant_buffers[cb].variables.push(Variable {
                    ty: ty.clone(),
                    name,
                    array_size,
                    matrix_layout,
                    line,
                });
            }

            if !self.allow(",") {
                break;
            }
            (name, line) = self.require_identifier()?;
        }
        self.require(";")
    }

    /// Index of the implicit `$Global` buffer, creating it at the current position on first use.
    fn global_cbuffer(&mut self, line: u32) -> usize {
        if let Some(idx) = self
            .constant_buffers
            .iter()
            .position(|cb| cb.is_implicit_global())
        {
            return idx;
        }
        let idx = self.constant_buffers.len();
        self.items.push(Item::ConstantBuffer(idx));
        self.constant_buffers.push(ConstantBuffer {
            name: GLOBAL_CBUFFER_NAME.to_string(),
            register: UNASSIGNED_REGISTER,
            variables: Vec::new(),
            line,
        });
        idx
    }

    /// Captures an initializer up to the next top-level `,` or `;`.
    fn skip_initializer(&mut self) -> Result<std::ops::Range<usize>, HlslError> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek_text(0) {
                "" => return Err(self.error("`;`")),
                "(" | "{" | "[" => depth += 1,
                ")" | "}" | "]" => depth = depth.saturating_sub(1),
                "," | ";" if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("initializer"));
        }
        Ok(start..self.pos)
    }

    fn parse_function(
        &mut self,
        return_type: HlslType,
        name: String,
        line: u32,
    ) -> Result<(), HlslError> {
        self.require("(")?;
        let mut params = Vec::new();
        if self.peek_text(0) == "void" && self.peek_text(1) == ")" {
            self.pos += 1;
        }
        if !self.allow(")") {
            loop {
                params.push(self.parse_parameter()?);
                if self.allow(",") {
                    continue;
                }
                self.require(")")?;
                break;
            }
        }

        let return_semantic = if self.allow(":") {
            Some(self.parse_semantic()?)
        } else {
            None
        };

        let body = if self.allow(";") {
            None
        } else {
            self.require("{")?;
            let start = self.pos;
            let mut depth = 1usize;
            loop {
                match self.peek_text(0) {
                    "" => return Err(self.error("`}`")),
                    "{" => depth += 1,
                    "}" => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                self.pos += 1;
            }
            let range = start..self.pos;
            self.pos += 1;
            Some(range)
        };

        self.items.push(Item::Function(self.functions.len()));
        self.functions.push(Function {
            return_type,
            return_semantic,
            name,
            params,
            body,
            line,
        });
        Ok(())
    }

    fn parse_parameter(&mut self) -> Result<Parameter, HlslError> {
        let mut direction = ParamDirection::In;
        let mut interpolation = None;
        loop {
            let word = self.peek_text(0);
            match word {
                "in" => {}
                "out" => direction = ParamDirection::Out,
                "inout" => direction = ParamDirection::InOut,
                "const" => {}
                "uniform" => {
                    return Err(HlslError::unsupported(self.line(), "uniform entry parameters"))
                }
                w => match InterpolationModifier::from_keyword(w) {
                    Some(m) => interpolation = Some(m),
                    None => break,
                },
            }
            self.pos += 1;
        }

        let word = self.peek_text(0);
        if TextureType::from_keyword(word).is_some()
            || matches!(word, "SamplerState" | "sampler" | "SamplerComparisonState")
        {
            return Err(HlslError::unsupported(
                self.line(),
                "texture and sampler function parameters",
            ));
        }

        let ty = self.parse_value_type()?;
        let (name, line) = self.require_identifier()?;
        let array_size = self.parse_array_size()?;
        let semantic = if self.allow(":") {
            Some(self.parse_semantic()?)
        } else {
            None
        };
        if self.peek_text(0) == "=" {
            return Err(HlslError::unsupported(line, "default parameter values"));
        }
        Ok(Parameter {
            direction,
            interpolation,
            ty,
            name,
            array_size,
            semantic,
            line,
        })
    }

    fn finish(mut self) -> Result<HlslModule, HlslError> {
        let mut main = None;
        for (idx, f) in self.functions.iter().enumerate() {
            if f.name != "main" || f.body.is_none() {
                continue;
            }
            if main.is_some() {
                return Err(HlslError::MultipleMain { line: f.line });
            }
            main = Some(idx);
        }
        let main = main.ok_or(HlslError::MissingMain { line: self.line() })?;

        resolve_registers(
            &mut self.constant_buffers,
            &mut self.textures,
            &mut self.samplers,
        )?;

        Ok(HlslModule {
            stage: self.stage,
            tokens: self.tokens,
            structs: self.structs,
            constant_buffers: self.constant_buffers,
            textures: self.textures,
            samplers: self.samplers,
            statics: self.statics,
            functions: self.functions,
            items: self.items,
            main,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn parse_src(src: &str) -> Result<HlslModule, HlslError> {
        parse(tokenize(src).unwrap(), ShaderStage::Pixel)
    }

    #[test]
    fn parses_structs_with_semantics_and_modifiers() {
        let m = parse_src(
            "struct PSIn { float4 pos : SV_Position; nointerpolation uint id : ID; float2 uv[2] : TEXCOORD1; };
             float4 main(PSIn i) : SV_Target { return i.pos; }",
        )
        .unwrap();
        let s = &m.structs[0];
        assert_eq!(s.name, "PSIn");
        assert_eq!(s.fields.len(), 3);
        assert_eq!(
            s.fields[1].interpolation,
            Some(InterpolationModifier::NoInterpolation)
        );
        assert_eq!(s.fields[2].array_size, Some(2));
        assert_eq!(s.fields[2].semantic.as_ref().unwrap().index, 1);
    }

    #[test]
    fn loose_globals_join_the_implicit_global_buffer() {
        let m = parse_src(
            "float4 tint; static const float scale = 2.0; float bias;
             float4 main() : SV_Target { return tint * scale + bias; }",
        )
        .unwrap();
        assert_eq!(m.constant_buffers.len(), 1);
        let globals = &m.constant_buffers[0];
        assert!(globals.is_implicit_global());
        assert_eq!(globals.register, 0);
        let names: Vec<_> = globals.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["tint", "bias"]);
        assert_eq!(m.statics[0].name, "scale");
        assert!(m.statics[0].initializer.is_some());
    }

    #[test]
    fn function_bodies_are_token_ranges() {
        let m = parse_src("float f(float x) { if (x > 0) { return x; } return -x; } float4 main() : SV_Target { return f(1); }").unwrap();
        let body = m.functions[0].body.clone().unwrap();
        assert_eq!(m.tokens[body.start].text, "if");
        assert_eq!(m.tokens[body.end].text, "}");
        assert_eq!(m.main, 1);
    }

    #[test]
    fn prototypes_have_no_body() {
        let m = parse_src("float f(float x); float4 main() : SV_Target { return f(1); } float f(float x) { return x; }").unwrap();
        assert!(m.functions[0].body.is_none());
        assert_eq!(m.main, 1);
    }

    #[test]
    fn unknown_types_report_their_line() {
        let err = parse_src("float4 a;\nfloat5 b;").unwrap_err();
        assert_eq!(
            err,
            HlslError::UnknownType {
                line: 2,
                name: "float5".into()
            }
        );
    }

    #[test]
    fn missing_tokens_are_parse_errors() {
        let err = parse_src("cbuffer CB { float4 a }").unwrap_err();
        assert!(matches!(err, HlslError::Parse { ref expected, .. } if expected == "`;`"));
    }

    #[test]
    fn main_must_be_unique() {
        let err = parse_src(
            "float4 main() : SV_Target { return 0; }\nfloat4 main() : SV_Target { return 1; }",
        )
        .unwrap_err();
        assert_eq!(err, HlslError::MultipleMain { line: 2 });

        let err = parse_src("float4 other() { return 0; }").unwrap_err();
        assert!(matches!(err, HlslError::MissingMain { .. }));
    }

    #[test]
    fn register_kind_must_match_declaration() {
        let err = parse_src("Texture2D tex : register(s0);").unwrap_err();
        assert!(matches!(err, HlslError::Parse { ref expected, .. } if expected == "`t` register"));
    }

    #[test]
    fn templated_textures_and_multiple_declarators() {
        let m = parse_src(
            "Texture2D<float4> a, b : register(t0); SamplerState s;
             float4 main() : SV_Target { return 0; }",
        )
        .unwrap();
        assert_eq!(m.textures[0].register, 1);
        assert_eq!(m.textures[1].register, 0);
        assert_eq!(m.samplers[0].register, 0);
    }
}
