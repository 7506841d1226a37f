//! GLSL ES 3.00 emission.
//!
//! Declarations are emitted from the semantic model in source order. Function bodies are
//! re-walked token by token; the rewrites applied there (sample calls, casts, matrix
//! constructors, literal suffixes, identifier renames) are purely local, so no expression tree is
//! built. The HLSL entry point is emitted as an ordinary function named `xc_main`, and a
//! synthesized `main()` moves stage inputs into its parameters and its results into the stage
//! outputs.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::ops::Range;

use tracing::debug;

use crate::ast::{
    ConstantBuffer, Function, HlslModule, InterpolationModifier, Item, MatrixLayout, ParamDirection,
    SamplerDecl, Semantic, ShaderStage, StaticGlobal, StructDecl, TextureDecl, TextureType,
};
use crate::error::HlslError;
use crate::limits::{MAX_RENDER_TARGETS, MAX_VERTEX_INPUTS};
use crate::reflection::{Combination, ConstantBufferReflection, InputAttribute, ShaderReflection};
use crate::token::TokenKind;
use crate::types::{round_up, HlslType, ScalarKind};

/// Prefix of every name the generator introduces.
pub const GENERATED_PREFIX: &str = "xc_";

const HEADER: &[&str] = &[
    "#version 300 es",
    "precision highp float;",
    "precision highp int;",
    "precision highp sampler2D;",
    "precision highp sampler2DArray;",
    "precision highp sampler3D;",
    "precision highp samplerCube;",
];

/// HLSL intrinsics without a same-named GLSL counterpart.
const INTRINSIC_LIBRARY: &[&str] = &[
    "#define mul(a, b) ((a) * (b))",
    "#define saturate(x) clamp((x), 0.0, 1.0)",
    "#define lerp(a, b, t) mix((a), (b), (t))",
    "#define mad(a, b, c) ((a) * (b) + (c))",
    "#define rcp(x) (1.0 / (x))",
    "#define fmod(a, b) ((a) - (b) * trunc((a) / (b)))",
];

const INTRINSIC_RENAMES: &[(&str, &str)] = &[
    ("frac", "fract"),
    ("rsqrt", "inversesqrt"),
    ("ddx", "dFdx"),
    ("ddy", "dFdy"),
    ("ddx_coarse", "dFdx"),
    ("ddy_coarse", "dFdy"),
    ("ddx_fine", "dFdx"),
    ("ddy_fine", "dFdy"),
    ("atan2", "atan"),
];

/// Intrinsics GLSL ES has no way to express.
const UNSUPPORTED_INTRINSICS: &[&str] = &[
    "sincos", "tex2D", "tex2Dlod", "tex2Dbias", "texCUBE", "asfloat", "asint", "asuint",
    "countbits", "firstbithigh", "firstbitlow", "reversebits", "f16tof32", "f32tof16", "abort",
    "errorf", "printf",
];

/// GLSL words a user identifier must not collide with.
const GLSL_RESERVED: &[&str] = &[
    "attribute", "varying", "layout", "flat", "smooth", "invariant", "highp", "mediump", "lowp",
    "precision", "input", "output", "active", "filter", "common", "partition", "superp", "union",
    "enum", "goto", "sizeof", "cast", "using", "fixed", "public", "external", "interface", "long",
    "short", "hvec2", "hvec3", "hvec4", "dvec2", "dvec3", "dvec4", "fvec2", "fvec3", "fvec4",
    "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4", "uvec2", "uvec3", "uvec4", "bvec2",
    "bvec3", "bvec4", "mat2", "mat3", "mat4", "mat2x2", "mat2x3", "mat2x4", "mat3x2", "mat3x3",
    "mat3x4", "mat4x2", "mat4x3", "mat4x4", "sampler2D", "sampler3D", "samplerCube",
    "sampler2DArray", "sampler2DShadow", "isampler2D", "usampler2D", "texture", "textureLod",
    "textureGrad", "textureSize", "texelFetch", "mix", "fract", "inversesqrt", "dFdx", "dFdy",
    "trunc", "xc", "gl",
];

/// Statement attributes (`[unroll]`) that carry no meaning for the backend compiler.
const STATEMENT_ATTRIBUTES: &[&str] = &[
    "unroll",
    "loop",
    "branch",
    "flatten",
    "fastopt",
    "call",
    "forcecase",
    "allow_uav_condition",
];

/// Maps a user identifier onto a GLSL name that cannot collide with generated scaffolding,
/// GLSL-only keywords or built-ins.
pub fn glsl_ident(name: &str) -> String {
    if name == "main" {
        return format!("{GENERATED_PREFIX}main");
    }
    if name.starts_with(GENERATED_PREFIX)
        || name.starts_with("gl_")
        || name.contains("__")
        || GLSL_RESERVED.contains(&name)
    {
        format!("{GENERATED_PREFIX}u_{}", name.replace("__", "_u_"))
    } else {
        name.to_string()
    }
}

/// Strips HLSL literal suffixes GLSL does not accept. `1f` becomes `1.0`; `u` is kept.
fn glsl_literal(text: &str) -> String {
    if text.starts_with("0x") || text.starts_with("0X") {
        return text.trim_end_matches(['l', 'L']).to_string();
    }
    let trimmed = text.trim_end_matches(['f', 'F', 'h', 'H', 'l', 'L']);
    let float_suffix = text[trimmed.len()..]
        .chars()
        .any(|c| matches!(c, 'f' | 'F' | 'h' | 'H'));
    if float_suffix && !trimmed.contains(['.', 'e', 'E']) {
        format!("{trimmed}.0")
    } else {
        trimmed.to_string()
    }
}

struct GlslWriter {
    out: String,
    indent: usize,
}

impl GlslWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn indent(&mut self) {
        self.indent += 4;
    }

    fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(4);
    }

    fn line(&mut self, s: &str) {
        for _ in 0..self.indent {
            self.out.push(' ');
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    /// Writes rewritten body tokens, one statement per line.
    fn tokens(&mut self, pieces: &[String]) {
        let mut line = String::new();
        let mut parens = 0usize;
        let mut prev: [&str; 2] = ["", ""];

        for piece in pieces {
            let p = piece.as_str();
            if prev[0] == "}" && !matches!(p, "else" | "while" | ";" | "," | ")") {
                self.line(&line);
                line.clear();
                prev = ["", ""];
            }
            match p {
                "{" if parens == 0 => {
                    if !line.is_empty() {
                        line.push(' ');
                    }
                    line.push('{');
                    self.line(&line);
                    line.clear();
                    self.indent();
                    prev = ["", ""];
                    continue;
                }
                "}" if parens == 0 => {
                    if !line.is_empty() {
                        self.line(&line);
                        line.clear();
                    }
                    self.dedent();
                    line.push('}');
                    prev = ["}", ""];
                    continue;
                }
                "(" => parens += 1,
                ")" => parens = parens.saturating_sub(1),
                _ => {}
            }
            if needs_space(prev, p) {
                line.push(' ');
            }
            line.push_str(p);
            prev = [p, prev[0]];
            if p == ";" && parens == 0 {
                self.line(&line);
                line.clear();
                prev = ["", ""];
            }
        }
        if !line.is_empty() {
            self.line(&line);
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

fn is_word(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "if" | "for" | "while" | "switch" | "return" | "case" | "else" | "do"
    )
}

/// `prev[0]` is the previous piece, `prev[1]` the one before it.
fn needs_space(prev: [&str; 2], next: &str) -> bool {
    let [last, before] = prev;
    if last.is_empty() {
        return false;
    }
    if matches!(next, "." | "," | ";" | ")" | "]") {
        return false;
    }
    if matches!(last, "(" | "[" | "." | "!" | "~") {
        return false;
    }
    let operand_end = (is_word(last) && !is_keyword(last)) || last == ")" || last == "]";
    if matches!(next, "(" | "[" | "++" | "--") && operand_end {
        return false;
    }
    // Unary sign: no operand precedes it.
    if matches!(last, "-" | "+") {
        let binary = (is_word(before) && !is_keyword(before)) || before == ")" || before == "]";
        if !binary {
            return false;
        }
    }
    true
}

/// Translates a parsed module into GLSL ES 3.00 source and its reflection.
pub fn translate(module: &HlslModule) -> Result<(String, ShaderReflection), HlslError> {
    let mut translator = Translator {
        module,
        combinations: Vec::new(),
        zero_ctors: BTreeSet::new(),
        uses_clip: false,
    };

    // Bodies are rewritten first: combinations and helper needs must be known before any
    // declaration is written.
    let mut bodies = Vec::with_capacity(module.functions.len());
    for f in &module.functions {
        let body = match &f.body {
            Some(range) => {
                let mut out = Vec::new();
                translator.rewrite(range.clone(), &mut out)?;
                Some(out)
            }
            None => None,
        };
        bodies.push(body);
    }
    let mut statics = Vec::with_capacity(module.statics.len());
    for s in &module.statics {
        statics.push(translator.static_initializer(s)?);
    }
    translator.close_zero_ctors();

    let stage_io = translator.stage_io()?;

    let mut reflection = ShaderReflection::new(module.stage);
    reflection.inputs = stage_io.attributes.clone();
    reflection.render_targets = stage_io.render_targets.clone();
    reflection.writes_depth = stage_io.writes_depth;
    reflection.combinations = translator.combinations.clone();

    let mut w = GlslWriter::new();
    for line in HEADER {
        w.line(line);
    }
    w.blank();
    for line in INTRINSIC_LIBRARY {
        w.line(line);
    }

    let mut wrote_globals = false;
    for item in &module.items {
        match *item {
            Item::Struct(idx) => translator.emit_struct(&mut w, &module.structs[idx])?,
            Item::ConstantBuffer(idx) => {
                let cb = &module.constant_buffers[idx];
                if let Some(reflected) = translator.emit_constant_buffer(&mut w, cb)? {
                    reflection.constant_buffers.push(reflected);
                }
            }
            Item::Static(idx) => {
                translator.emit_static(&mut w, &module.statics[idx], &statics[idx])?;
            }
            Item::Function(idx) => {
                if !wrote_globals {
                    translator.emit_stage_globals(&mut w, &stage_io);
                    wrote_globals = true;
                }
                let f = &module.functions[idx];
                translator.emit_function(&mut w, f, bodies[idx].as_deref())?;
            }
        }
    }
    translator.emit_entry_wrapper(&mut w, &stage_io)?;

    Ok((w.finish(), reflection))
}

/// One stage input or output after flattening struct parameters into their fields.
#[derive(Clone)]
struct IoElement {
    semantic: Semantic,
    ty: HlslType,
    interpolation: Option<InterpolationModifier>,
    /// Expression inside the synthesized `main()` (`xc_p_input.uv`, `xc_ret`, ...).
    place: String,
    line: u32,
}

#[derive(Default)]
struct StageIo {
    declarations: Vec<String>,
    /// Parameter locals of the synthesized `main()`, with their GLSL type.
    locals: Vec<(String, String)>,
    /// `place = source` statements run before the entry call.
    loads: Vec<String>,
    /// `target = place` statements run after the entry call.
    stores: Vec<String>,
    call_args: Vec<String>,
    writes_position: bool,
    attributes: Vec<InputAttribute>,
    render_targets: Vec<u32>,
    writes_depth: bool,
}

struct Translator<'a> {
    module: &'a HlslModule,
    combinations: Vec<Combination>,
    /// Structs whose `xc_zero_*` constructor must be emitted.
    zero_ctors: BTreeSet<String>,
    uses_clip: bool,
}

impl<'a> Translator<'a> {
    fn text(&self, idx: usize) -> &'a str {
        let module: &'a HlslModule = self.module;
        module.tokens.get(idx).map_or("", |t| t.text.as_str())
    }

    fn line_at(&self, idx: usize) -> u32 {
        let tokens = &self.module.tokens;
        tokens
            .get(idx)
            .or_else(|| tokens.last())
            .map_or(1, |t| t.line)
    }

    fn glsl_type(&self, ty: &HlslType, line: u32) -> Result<String, HlslError> {
        ty.glsl_name(glsl_ident)
            .ok_or_else(|| HlslError::unsupported(line, "non-float matrix types"))
    }

    /// Index of the bracket closing the one at `open`, searching before `end`.
    fn matching(&self, open: usize, end: usize) -> Result<usize, HlslError> {
        let (o, c) = match self.text(open) {
            "(" => ("(", ")"),
            "[" => ("[", "]"),
            _ => ("{", "}"),
        };
        let mut depth = 0usize;
        for idx in open..end {
            let t = self.text(idx);
            if t == o {
                depth += 1;
            } else if t == c {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
        }
        Err(HlslError::Parse {
            line: self.line_at(open),
            expected: format!("`{c}`"),
            found: "end of statement".to_string(),
        })
    }

    /// Splits the arguments between `open` and its closing bracket `close` at top-level commas.
    fn split_args(&self, open: usize, close: usize) -> Vec<Range<usize>> {
        if open + 1 == close {
            return Vec::new();
        }
        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut start = open + 1;
        for idx in open + 1..close {
            match self.text(idx) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "," if depth == 0 => {
                    args.push(start..idx);
                    start = idx + 1;
                }
                _ => {}
            }
        }
        args.push(start..close);
        args
    }

    /// End (exclusive) of the unary/primary/postfix expression starting at `start`.
    fn primary_end(&self, start: usize, end: usize) -> Result<usize, HlslError> {
        let mut idx = start;
        while idx < end && matches!(self.text(idx), "-" | "+" | "!" | "~") {
            idx += 1;
        }
        let tok = self.module.tokens.get(idx).filter(|_| idx < end);
        idx = match tok {
            Some(t) if t.is("(") => self.matching(idx, end)? + 1,
            Some(t) if t.kind != TokenKind::Punct => idx + 1,
            _ => {
                return Err(HlslError::Parse {
                    line: self.line_at(idx),
                    expected: "expression".to_string(),
                    found: tok.map_or_else(|| "end of statement".into(), |t| format!("`{}`", t.text)),
                })
            }
        };
        loop {
            match self.text(idx) {
                "." if idx + 1 < end => idx += 2,
                "[" if idx < end => idx = self.matching(idx, end)? + 1,
                "(" if idx < end && self.module.tokens[idx - 1].is_identifier() => {
                    idx = self.matching(idx, end)? + 1;
                }
                _ => break,
            }
        }
        Ok(idx.min(end))
    }

    fn rewrite(&mut self, range: Range<usize>, out: &mut Vec<String>) -> Result<(), HlslError> {
        let module: &'a HlslModule = self.module;
        let mut idx = range.start;
        while idx < range.end {
            let tok = &module.tokens[idx];
            match tok.kind {
                TokenKind::Number => {
                    out.push(glsl_literal(&tok.text));
                    idx += 1;
                }
                TokenKind::Punct => {
                    if tok.is("(") {
                        if let Some(next) = self.rewrite_cast(idx, range.end, out)? {
                            idx = next;
                            continue;
                        }
                    }
                    if tok.is("[") {
                        if let Some(next) = self.skip_statement_attribute(idx, &range)? {
                            idx = next;
                            continue;
                        }
                    }
                    out.push(tok.text.clone());
                    idx += 1;
                }
                TokenKind::Identifier => idx = self.rewrite_identifier(idx, range.end, out)?,
            }
        }
        Ok(())
    }

    fn skip_statement_attribute(
        &self,
        idx: usize,
        range: &Range<usize>,
    ) -> Result<Option<usize>, HlslError> {
        let at_statement_start = idx == range.start || matches!(self.text(idx - 1), ";" | "{" | "}");
        if !at_statement_start || !STATEMENT_ATTRIBUTES.contains(&self.text(idx + 1)) {
            return Ok(None);
        }
        Ok(Some(self.matching(idx, range.end)? + 1))
    }

    /// Rewrites `(type)expr` into constructor form. Returns `None` when `(` does not open a cast.
    fn rewrite_cast(
        &mut self,
        idx: usize,
        end: usize,
        out: &mut Vec<String>,
    ) -> Result<Option<usize>, HlslError> {
        if idx + 3 >= end || self.text(idx + 2) != ")" {
            return Ok(None);
        }
        if idx > 0 {
            let prev = &self.module.tokens[idx - 1];
            let prev_is_operand = (prev.kind != TokenKind::Punct && !is_keyword(&prev.text))
                || prev.is(")")
                || prev.is("]");
            if prev_is_operand {
                return Ok(None);
            }
        }
        let name = self.text(idx + 1);
        let line = self.line_at(idx);
        let ty = match HlslType::builtin_or_shorthand(name) {
            Some(HlslType::Void) => return Ok(None),
            Some(ty) => ty,
            None if self.module.struct_decl(name).is_some() => HlslType::Struct(name.to_string()),
            None => return Ok(None),
        };

        let start = idx + 3;
        let stop = self.primary_end(start, end)?;
        if let HlslType::Struct(name) = ty {
            if stop == start + 1 && self.text(start) == "0" {
                self.mark_zero_ctor(&name);
                out.push(format!("{GENERATED_PREFIX}zero_{}", glsl_ident(&name)));
                out.push("(".to_string());
                out.push(")".to_string());
                return Ok(Some(stop));
            }
            return Err(HlslError::unsupported(
                line,
                format!("cast to struct `{name}` from anything but 0"),
            ));
        }

        out.push(self.glsl_type(&ty, line)?);
        out.push("(".to_string());
        self.rewrite(start..stop, out)?;
        out.push(")".to_string());
        Ok(Some(stop))
    }

    fn rewrite_identifier(
        &mut self,
        idx: usize,
        end: usize,
        out: &mut Vec<String>,
    ) -> Result<usize, HlslError> {
        let module: &'a HlslModule = self.module;
        let tok = &module.tokens[idx];
        let name = tok.text.as_str();

        // Member names and swizzles.
        if idx > 0 && module.tokens[idx - 1].is(".") {
            out.push(glsl_ident(name));
            return Ok(idx + 1);
        }
        if let Some(texture) = module.texture(name) {
            return self.rewrite_sample(idx, end, texture, out);
        }
        if module.sampler(name).is_some() {
            return Err(HlslError::unsupported(
                tok.line,
                format!("sampler `{name}` used outside a sample call"),
            ));
        }
        if let Some(ty) = HlslType::builtin_or_shorthand(name) {
            if let HlslType::Matrix { scalar, rows, cols } = ty {
                if self.text(idx + 1) == "(" {
                    let close = self.matching(idx + 1, end)?;
                    let args = self.split_args(idx + 1, close);
                    if args.len() > 1 {
                        // HLSL fills matrices row by row, GLSL column by column.
                        let transposed = HlslType::Matrix {
                            scalar,
                            rows: cols,
                            cols: rows,
                        };
                        out.push("transpose".to_string());
                        out.push("(".to_string());
                        out.push(self.glsl_type(&transposed, tok.line)?);
                        self.rewrite_call_args(idx + 1, close, out)?;
                        out.push(")".to_string());
                        return Ok(close + 1);
                    }
                }
            }
            out.push(self.glsl_type(&ty, tok.line)?);
            return Ok(idx + 1);
        }
        if name == "static" {
            return Err(HlslError::unsupported(tok.line, "static local variables"));
        }
        if UNSUPPORTED_INTRINSICS.contains(&name) {
            return Err(HlslError::unsupported(tok.line, format!("intrinsic `{name}`")));
        }
        if name == "clip" && self.text(idx + 1) == "(" {
            if module.stage != ShaderStage::Pixel {
                return Err(HlslError::unsupported(tok.line, "`clip` outside a pixel shader"));
            }
            self.uses_clip = true;
            out.push(format!("{GENERATED_PREFIX}clip"));
            return Ok(idx + 1);
        }
        if let Some((_, renamed)) = INTRINSIC_RENAMES.iter().find(|(from, _)| *from == name) {
            out.push((*renamed).to_string());
            return Ok(idx + 1);
        }
        out.push(glsl_ident(name));
        Ok(idx + 1)
    }

    /// Emits `(arg, arg, ...)` for the call whose parentheses are at `open`/`close`.
    fn rewrite_call_args(
        &mut self,
        open: usize,
        close: usize,
        out: &mut Vec<String>,
    ) -> Result<(), HlslError> {
        out.push("(".to_string());
        for (n, arg) in self.split_args(open, close).into_iter().enumerate() {
            if n > 0 {
                out.push(",".to_string());
            }
            self.rewrite(arg, out)?;
        }
        out.push(")".to_string());
        Ok(())
    }

    /// `tex.Sample(samp, uv)` and friends.
    fn rewrite_sample(
        &mut self,
        idx: usize,
        end: usize,
        texture: &'a TextureDecl,
        out: &mut Vec<String>,
    ) -> Result<usize, HlslError> {
        let line = self.line_at(idx);
        let method = self.text(idx + 2);
        if self.text(idx + 1) != "." || self.text(idx + 3) != "(" || idx + 3 >= end {
            return Err(HlslError::unsupported(
                line,
                format!("texture `{}` used outside a sample call", texture.name),
            ));
        }
        let (function, arg_count) = match method {
            "Sample" => ("texture", 2),
            "SampleBias" => ("texture", 3),
            "SampleLevel" => ("textureLod", 3),
            "SampleGrad" => ("textureGrad", 4),
            other => {
                return Err(HlslError::unsupported(
                    line,
                    format!("texture method `{other}`"),
                ))
            }
        };
        let open = idx + 3;
        let close = self.matching(open, end)?;
        let args = self.split_args(open, close);
        if args.len() != arg_count {
            return Err(HlslError::unsupported(
                line,
                format!(
                    "`{method}` with {} arguments (expected {arg_count})",
                    args.len()
                ),
            ));
        }

        let module: &'a HlslModule = self.module;
        let sampler_arg = &args[0];
        let sampler_name = self.text(sampler_arg.start);
        if sampler_arg.len() != 1 || !module.tokens[sampler_arg.start].is_identifier() {
            return Err(HlslError::unsupported(
                line,
                "sampler argument must name a global sampler",
            ));
        }
        let Some(sampler) = module.sampler(sampler_name) else {
            return Err(HlslError::UnknownIdentifier {
                line,
                name: sampler_name.to_string(),
            });
        };
        let combination = self.combination(texture, sampler);

        let one_d = texture.ty == TextureType::Texture1D;
        let swizzle = match &texture.element {
            Some(HlslType::Scalar(_)) => Some(".x"),
            Some(HlslType::Vector(_, 2)) => Some(".xy"),
            Some(HlslType::Vector(_, 3)) => Some(".xyz"),
            _ => None,
        };

        if swizzle.is_some() {
            out.push("(".to_string());
        }
        out.push(function.to_string());
        out.push("(".to_string());
        out.push(combination);
        for (n, arg) in args.into_iter().enumerate().skip(1) {
            out.push(",".to_string());
            // Coordinates and gradients of 1D textures address row 0 of a 2D texture.
            let widen = one_d && (n == 1 || (method == "SampleGrad" && n >= 2));
            if widen {
                out.push("vec2".to_string());
                out.push("(".to_string());
            }
            self.rewrite(arg, out)?;
            if widen {
                out.push(",".to_string());
                out.push(if n == 1 { "0.5" } else { "0.0" }.to_string());
                out.push(")".to_string());
            }
        }
        out.push(")".to_string());
        if let Some(swizzle) = swizzle {
            out.push(")".to_string());
            out.push(".".to_string());
            out.push(swizzle[1..].to_string());
        }
        Ok(close + 1)
    }

    fn combination(&mut self, texture: &TextureDecl, sampler: &SamplerDecl) -> String {
        if let Some(existing) = self
            .combinations
            .iter()
            .find(|c| c.texture == texture.name && c.sampler == sampler.name)
        {
            return existing.name.clone();
        }
        let name = format!(
            "{GENERATED_PREFIX}{}_combo{}_{}_{}",
            self.module.stage.tag(),
            self.combinations.len(),
            texture.name,
            sampler.name
        );
        debug!(
            combination = %name,
            texture = %texture.name,
            sampler = %sampler.name,
            "new texture/sampler combination"
        );
        self.combinations.push(Combination {
            name: name.clone(),
            texture: texture.name.clone(),
            texture_register: texture.register as u32,
            texture_type: texture.ty,
            sampler: sampler.name.clone(),
            sampler_register: sampler.register as u32,
        });
        name
    }

    fn mark_zero_ctor(&mut self, name: &str) {
        self.zero_ctors.insert(name.to_string());
    }

    /// Adds the zero constructors of nested struct fields.
    fn close_zero_ctors(&mut self) {
        let mut pending: Vec<String> = self.zero_ctors.iter().cloned().collect();
        while let Some(name) = pending.pop() {
            let Some(decl) = self.module.struct_decl(&name) else {
                continue;
            };
            for field in &decl.fields {
                if let HlslType::Struct(inner) = &field.ty {
                    if self.zero_ctors.insert(inner.clone()) {
                        pending.push(inner.clone());
                    }
                }
            }
        }
    }

    /// Rewritten initializer of a static global, as GLSL pieces.
    fn static_initializer(&mut self, global: &StaticGlobal) -> Result<Option<Vec<String>>, HlslError> {
        let Some(range) = global.initializer.clone() else {
            return Ok(None);
        };
        let mut out = Vec::new();
        if self.text(range.start) == "{" {
            let close = self.matching(range.start, range.end)?;
            let Some(size) = global.array_size.filter(|_| close + 1 == range.end) else {
                return Err(HlslError::unsupported(
                    global.line,
                    "brace initializers outside one-dimensional arrays",
                ));
            };
            out.push(format!("{}[{size}]", self.glsl_type(&global.ty, global.line)?));
            self.rewrite_call_args(range.start, close, &mut out)?;
        } else {
            self.rewrite(range, &mut out)?;
        }
        Ok(Some(out))
    }

    fn std140_of(&self, ty: &HlslType, array_size: Option<u32>, row_major: bool) -> (u32, u32) {
        let (size, align) = ty.std140_size_align(row_major, &|name| self.struct_std140(name));
        match array_size {
            Some(n) => (round_up(size, 16) * n, 16),
            None => (size, align),
        }
    }

    fn struct_std140(&self, name: &str) -> (u32, u32) {
        let Some(decl) = self.module.struct_decl(name) else {
            return (0, 0);
        };
        let mut offset = 0;
        for field in &decl.fields {
            let (size, align) = self.std140_of(&field.ty, field.array_size, false);
            offset = round_up(offset, align) + size;
        }
        (round_up(offset, 16), 16)
    }

    fn declarator(&self, ty: &HlslType, name: &str, array_size: Option<u32>, line: u32) -> Result<String, HlslError> {
        let mut s = format!("{} {}", self.glsl_type(ty, line)?, glsl_ident(name));
        if let Some(n) = array_size {
            let _ = write!(s, "[{n}]");
        }
        Ok(s)
    }

    fn emit_struct(&self, w: &mut GlslWriter, decl: &StructDecl) -> Result<(), HlslError> {
        let name = glsl_ident(&decl.name);
        w.blank();
        w.line(&format!("struct {name} {{"));
        w.indent();
        for field in &decl.fields {
            let d = self.declarator(&field.ty, &field.name, field.array_size, field.line)?;
            w.line(&format!("{d};"));
        }
        w.dedent();
        w.line("};");

        if self.zero_ctors.contains(&decl.name) {
            w.blank();
            w.line(&format!("{name} {GENERATED_PREFIX}zero_{name}() {{"));
            w.indent();
            w.line(&format!("{name} z;"));
            for field in &decl.fields {
                let ty = self.glsl_type(&field.ty, field.line)?;
                let zero = field.ty.glsl_zero(&ty);
                let member = glsl_ident(&field.name);
                match field.array_size {
                    Some(n) => w.line(&format!(
                        "for (int i = 0; i < {n}; ++i) z.{member}[i] = {zero};"
                    )),
                    None => w.line(&format!("z.{member} = {zero};")),
                }
            }
            w.line("return z;");
            w.dedent();
            w.line("}");
        }
        Ok(())
    }

    fn emit_constant_buffer(
        &self,
        w: &mut GlslWriter,
        cb: &ConstantBuffer,
    ) -> Result<Option<ConstantBufferReflection>, HlslError> {
        if cb.variables.is_empty() {
            debug!(cbuffer = %cb.name, "skipping empty constant buffer");
            return Ok(None);
        }
        let stage = self.module.stage.tag();
        let block_name = if cb.is_implicit_global() {
            format!("{GENERATED_PREFIX}{stage}_cb_Globals")
        } else {
            format!("{GENERATED_PREFIX}{stage}_cb_{}", cb.name)
        };

        w.blank();
        w.line(&format!("layout(std140) uniform {block_name} {{"));
        w.indent();
        let mut offset = 0;
        for var in &cb.variables {
            let row_major = var.matrix_layout == Some(MatrixLayout::RowMajor);
            let d = self.declarator(&var.ty, &var.name, var.array_size, var.line)?;
            if row_major && var.ty.is_matrix() {
                w.line(&format!("layout(row_major) {d};"));
            } else {
                w.line(&format!("{d};"));
            }
            let (size, align) = self.std140_of(&var.ty, var.array_size, row_major);
            offset = round_up(offset, align) + size;
        }
        w.dedent();
        w.line("};");

        Ok(Some(ConstantBufferReflection {
            name: cb.name.clone(),
            block_name,
            register: cb.register as u32,
            size_bytes: round_up(offset, 16),
        }))
    }

    fn emit_static(
        &self,
        w: &mut GlslWriter,
        global: &StaticGlobal,
        initializer: &Option<Vec<String>>,
    ) -> Result<(), HlslError> {
        let d = self.declarator(&global.ty, &global.name, global.array_size, global.line)?;
        let qualifier = if global.is_const { "const " } else { "" };
        w.blank();
        match initializer {
            Some(pieces) => {
                let mut sub = GlslWriter::new();
                sub.tokens(pieces);
                let value = sub.finish();
                w.line(&format!("{qualifier}{d} = {};", value.trim_end()));
            }
            None => w.line(&format!("{qualifier}{d};")),
        }
        Ok(())
    }

    /// Stage inputs/outputs, combination samplers and helpers, written once before the first
    /// function.
    fn emit_stage_globals(&self, w: &mut GlslWriter, io: &StageIo) {
        if !io.declarations.is_empty() {
            w.blank();
            for d in &io.declarations {
                w.line(d);
            }
        }
        if !self.combinations.is_empty() {
            w.blank();
            for c in &self.combinations {
                w.line(&format!("uniform {} {};", c.texture_type.glsl_sampler(), c.name));
            }
        }
        if self.uses_clip {
            w.blank();
            w.line(&format!(
                "void {GENERATED_PREFIX}clip(float x) {{ if (x < 0.0) discard; }}"
            ));
            for n in 2..=4 {
                w.line(&format!(
                    "void {GENERATED_PREFIX}clip(vec{n} x) {{ if (any(lessThan(x, vec{n}(0.0)))) discard; }}"
                ));
            }
        }
    }

    fn emit_function(
        &self,
        w: &mut GlslWriter,
        f: &Function,
        body: Option<&[String]>,
    ) -> Result<(), HlslError> {
        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            let direction = match p.direction {
                ParamDirection::In => "",
                ParamDirection::Out => "out ",
                ParamDirection::InOut => "inout ",
            };
            let d = self.declarator(&p.ty, &p.name, p.array_size, p.line)?;
            params.push(format!("{direction}{d}"));
        }
        let signature = format!(
            "{} {}({})",
            self.glsl_type(&f.return_type, f.line)?,
            glsl_ident(&f.name),
            params.join(", ")
        );

        w.blank();
        match body {
            None => w.line(&format!("{signature};")),
            Some(pieces) => {
                w.line(&format!("{signature} {{"));
                w.indent();
                w.tokens(pieces);
                w.dedent();
                w.line("}");
            }
        }
        Ok(())
    }

    fn emit_entry_wrapper(&self, w: &mut GlslWriter, io: &StageIo) -> Result<(), HlslError> {
        let entry = self.module.entry();
        w.blank();
        w.line("void main() {");
        w.indent();
        for (ty, name) in &io.locals {
            w.line(&format!("{ty} {name};"));
        }
        for load in &io.loads {
            w.line(load);
        }
        let call = format!("{GENERATED_PREFIX}main({})", io.call_args.join(", "));
        if entry.return_type == HlslType::Void {
            w.line(&format!("{call};"));
        } else {
            let ty = self.glsl_type(&entry.return_type, entry.line)?;
            w.line(&format!("{ty} {GENERATED_PREFIX}ret = {call};"));
        }
        for store in &io.stores {
            w.line(store);
        }
        if io.writes_position {
            // D3D clip-space depth is [0, w]; GL expects [-w, w].
            w.line("gl_Position.z = gl_Position.z * 2.0 - gl_Position.w;");
        }
        w.dedent();
        w.line("}");
        Ok(())
    }

    /// Flattens entry parameters and the return value into stage inputs and outputs.
    fn stage_io(&self) -> Result<StageIo, HlslError> {
        let entry = self.module.entry();
        let mut io = StageIo::default();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();

        for p in &entry.params {
            if p.array_size.is_some() {
                return Err(HlslError::unsupported(p.line, "array entry parameters"));
            }
            let local = format!("{GENERATED_PREFIX}p_{}", p.name);
            io.locals.push((self.glsl_type(&p.ty, p.line)?, local.clone()));
            io.call_args.push(local.clone());
            let reads = matches!(p.direction, ParamDirection::In | ParamDirection::InOut);
            let writes = matches!(p.direction, ParamDirection::Out | ParamDirection::InOut);
            let mut elements = Vec::new();
            self.flatten(&p.ty, p.semantic.as_ref(), p.interpolation, &local, &p.name, p.line, &mut elements)?;
            if writes {
                outputs.extend(elements.iter().cloned());
            }
            if reads {
                inputs.extend(elements);
            }
        }
        if entry.return_type != HlslType::Void {
            let place = format!("{GENERATED_PREFIX}ret");
            self.flatten(
                &entry.return_type,
                entry.return_semantic.as_ref(),
                None,
                &place,
                "return value",
                entry.line,
                &mut outputs,
            )?;
        }

        let mut seen = HashSet::new();
        for input in &inputs {
            check_unique(&mut seen, &input.semantic, input.line)?;
            match self.module.stage {
                ShaderStage::Vertex => self.vertex_input(input, &mut io)?,
                ShaderStage::Pixel => self.pixel_input(input, &mut io)?,
            }
        }
        let mut seen = HashSet::new();
        for output in &outputs {
            check_unique(&mut seen, &normalize_target(&output.semantic), output.line)?;
            match self.module.stage {
                ShaderStage::Vertex => self.vertex_output(output, &mut io)?,
                ShaderStage::Pixel => self.pixel_output(output, &mut io)?,
            }
        }
        if self.module.stage == ShaderStage::Vertex && !io.writes_position {
            return Err(HlslError::UnsupportedSemantic {
                line: entry.line,
                semantic: "SV_POSITION".to_string(),
                reason: "vertex shaders must output a position",
            });
        }
        io.render_targets.sort_unstable();
        Ok(io)
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten(
        &self,
        ty: &HlslType,
        semantic: Option<&Semantic>,
        interpolation: Option<InterpolationModifier>,
        place: &str,
        what: &str,
        line: u32,
        out: &mut Vec<IoElement>,
    ) -> Result<(), HlslError> {
        if let HlslType::Struct(name) = ty {
            let decl = self
                .module
                .struct_decl(name)
                .ok_or_else(|| HlslError::UnknownType {
                    line,
                    name: name.clone(),
                })?;
            for field in &decl.fields {
                if matches!(field.ty, HlslType::Struct(_)) || field.array_size.is_some() {
                    return Err(HlslError::unsupported(
                        field.line,
                        format!("nested or array stage field `{}`", field.name),
                    ));
                }
                let Some(semantic) = &field.semantic else {
                    return Err(HlslError::unsupported(
                        field.line,
                        format!("stage field `{}` has no semantic", field.name),
                    ));
                };
                out.push(IoElement {
                    semantic: semantic.clone(),
                    ty: field.ty.clone(),
                    interpolation: field.interpolation,
                    place: format!("{place}.{}", glsl_ident(&field.name)),
                    line: field.line,
                });
            }
            return Ok(());
        }
        let Some(semantic) = semantic else {
            return Err(HlslError::unsupported(line, format!("{what} has no semantic")));
        };
        out.push(IoElement {
            semantic: semantic.clone(),
            ty: ty.clone(),
            interpolation,
            place: place.to_string(),
            line,
        });
        Ok(())
    }

    fn varying_declaration(
        &self,
        element: &IoElement,
        direction: &str,
        name: &str,
    ) -> Result<String, HlslError> {
        if matches!(element.ty.scalar_kind(), Some(ScalarKind::Bool) | None) {
            return Err(unsupported_semantic(element, "varyings must be numeric"));
        }
        let qualifier = match element.interpolation {
            _ if element.ty.is_integer() => "flat ",
            Some(InterpolationModifier::NoInterpolation) => "flat ",
            Some(InterpolationModifier::Centroid) => "centroid ",
            Some(InterpolationModifier::Linear) | None => "",
            Some(other) => {
                return Err(HlslError::unsupported(
                    element.line,
                    format!("{other:?} interpolation"),
                ))
            }
        };
        let ty = self.glsl_type(&element.ty, element.line)?;
        Ok(format!("{qualifier}{direction} {ty} {name};"))
    }

    fn vertex_input(&self, input: &IoElement, io: &mut StageIo) -> Result<(), HlslError> {
        let builtin = match input.semantic.name.as_str() {
            "SV_VERTEXID" => Some("gl_VertexID"),
            "SV_INSTANCEID" => Some("gl_InstanceID"),
            _ => None,
        };
        if let Some(builtin) = builtin {
            if !matches!(input.ty, HlslType::Scalar(ScalarKind::Int | ScalarKind::Uint)) {
                return Err(unsupported_semantic(input, "must be a scalar integer"));
            }
            let ty = self.glsl_type(&input.ty, input.line)?;
            io.loads.push(format!("{} = {ty}({builtin});", input.place));
            return Ok(());
        }
        if input.semantic.is_system_value() {
            return Err(unsupported_semantic(input, "not available as a vertex input"));
        }

        let components = match input.ty {
            HlslType::Scalar(s) if s != ScalarKind::Bool => 1,
            HlslType::Vector(s, n) if s != ScalarKind::Bool => n,
            _ => {
                return Err(unsupported_semantic(
                    input,
                    "vertex inputs must be numeric scalars or vectors",
                ))
            }
        };
        let location = io.attributes.len() as u32;
        if location >= MAX_VERTEX_INPUTS {
            return Err(unsupported_semantic(input, "too many vertex inputs"));
        }
        let name = format!("{GENERATED_PREFIX}in_{}", input.semantic);
        let ty = self.glsl_type(&input.ty, input.line)?;
        io.declarations
            .push(format!("layout(location = {location}) in {ty} {name};"));
        io.loads.push(format!("{} = {name};", input.place));
        io.attributes.push(InputAttribute {
            semantic_name: input.semantic.name.clone(),
            semantic_index: input.semantic.index,
            location,
            glsl_name: name,
            components,
            integer: input.ty.is_integer(),
        });
        Ok(())
    }

    fn vertex_output(&self, output: &IoElement, io: &mut StageIo) -> Result<(), HlslError> {
        if output.semantic.name == "SV_POSITION" {
            if output.ty != HlslType::Vector(ScalarKind::Float, 4) {
                return Err(unsupported_semantic(output, "position must be float4"));
            }
            io.stores.push(format!("gl_Position = {};", output.place));
            io.writes_position = true;
            return Ok(());
        }
        if output.semantic.is_system_value() {
            return Err(unsupported_semantic(output, "not available as a vertex output"));
        }
        let name = format!("{GENERATED_PREFIX}var_{}", output.semantic);
        io.declarations
            .push(self.varying_declaration(output, "out", &name)?);
        io.stores.push(format!("{name} = {};", output.place));
        Ok(())
    }

    fn pixel_input(&self, input: &IoElement, io: &mut StageIo) -> Result<(), HlslError> {
        match input.semantic.name.as_str() {
            "SV_POSITION" => {
                if input.ty != HlslType::Vector(ScalarKind::Float, 4) {
                    return Err(unsupported_semantic(input, "position must be float4"));
                }
                io.loads.push(format!("{} = gl_FragCoord;", input.place));
                Ok(())
            }
            "SV_ISFRONTFACE" => {
                let HlslType::Scalar(_) = input.ty else {
                    return Err(unsupported_semantic(input, "must be a scalar"));
                };
                let ty = self.glsl_type(&input.ty, input.line)?;
                io.loads.push(format!("{} = {ty}(gl_FrontFacing);", input.place));
                Ok(())
            }
            _ if input.semantic.is_system_value() => {
                Err(unsupported_semantic(input, "not available as a pixel input"))
            }
            _ => {
                let name = format!("{GENERATED_PREFIX}var_{}", input.semantic);
                io.declarations
                    .push(self.varying_declaration(input, "in", &name)?);
                io.loads.push(format!("{} = {name};", input.place));
                Ok(())
            }
        }
    }

    fn pixel_output(&self, output: &IoElement, io: &mut StageIo) -> Result<(), HlslError> {
        if output.semantic.name == "SV_DEPTH" {
            if output.ty != HlslType::Scalar(ScalarKind::Float) {
                return Err(unsupported_semantic(output, "depth must be float"));
            }
            io.stores.push(format!("gl_FragDepth = {};", output.place));
            io.writes_depth = true;
            return Ok(());
        }
        let target = normalize_target(&output.semantic);
        if target.name != "SV_TARGET" {
            return Err(unsupported_semantic(output, "not a pixel shader output"));
        }
        if target.index >= MAX_RENDER_TARGETS {
            return Err(unsupported_semantic(output, "render target index out of range"));
        }
        if !matches!(output.ty, HlslType::Scalar(s) | HlslType::Vector(s, _) if s != ScalarKind::Bool)
        {
            return Err(unsupported_semantic(
                output,
                "render target outputs must be numeric scalars or vectors",
            ));
        }
        let name = format!("{GENERATED_PREFIX}target{}", target.index);
        let ty = self.glsl_type(&output.ty, output.line)?;
        io.declarations
            .push(format!("layout(location = {}) out {ty} {name};", target.index));
        io.stores.push(format!("{name} = {};", output.place));
        io.render_targets.push(target.index);
        Ok(())
    }
}

/// `COLORn` is the legacy spelling of `SV_TARGETn` for pixel outputs.
fn normalize_target(semantic: &Semantic) -> Semantic {
    if semantic.name == "COLOR" {
        Semantic {
            name: "SV_TARGET".to_string(),
            index: semantic.index,
        }
    } else {
        semantic.clone()
    }
}

fn check_unique(
    seen: &mut HashSet<Semantic>,
    semantic: &Semantic,
    line: u32,
) -> Result<(), HlslError> {
    if seen.insert(semantic.clone()) {
        Ok(())
    } else {
        Err(HlslError::UnsupportedSemantic {
            line,
            semantic: semantic.to_string(),
            reason: "declared more than once",
        })
    }
}

fn unsupported_semantic(element: &IoElement, reason: &'static str) -> HlslError {
    HlslError::UnsupportedSemantic {
        line: element.line,
        semantic: element.semantic.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_suffixes_are_stripped() {
        assert_eq!(glsl_literal("1.0f"), "1.0");
        assert_eq!(glsl_literal("1f"), "1.0");
        assert_eq!(glsl_literal("0.5h"), "0.5");
        assert_eq!(glsl_literal("2u"), "2u");
        assert_eq!(glsl_literal("1e3f"), "1e3");
        assert_eq!(glsl_literal("0xFF"), "0xFF");
        assert_eq!(glsl_literal("7"), "7");
    }

    #[test]
    fn reserved_identifiers_are_renamed() {
        assert_eq!(glsl_ident("color"), "color");
        assert_eq!(glsl_ident("texture"), "xc_u_texture");
        assert_eq!(glsl_ident("xc_main"), "xc_u_xc_main");
        assert_eq!(glsl_ident("gl_thing"), "xc_u_gl_thing");
        assert_eq!(glsl_ident("vec3"), "xc_u_vec3");
        assert_eq!(glsl_ident("a__b"), "xc_u_a_u_b");
        assert_eq!(glsl_ident("main"), "xc_main");
    }

    #[test]
    fn spacing_reads_like_handwritten_glsl() {
        let pieces: Vec<String> = [
            "float", "x", "=", "-", "a", "[", "1", "]", "*", "f", "(", "b", ",", "c", ")", ";",
            "if", "(", "x", ">", "0.0", ")", "{", "x", "++", ";", "}", "else", "{", "return",
            "-", "x", ";", "}",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut w = GlslWriter::new();
        w.tokens(&pieces);
        assert_eq!(
            w.finish(),
            "float x = -a[1] * f(b, c);\nif (x > 0.0) {\n    x++;\n} else {\n    return -x;\n}\n"
        );
    }
}
