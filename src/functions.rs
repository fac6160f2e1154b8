//! Function registry and the cssx standard library.
//!
//! The registry maps names to callables. Built-ins are seeded at
//! construction; `register` merges on top with last-write-wins, so user
//! functions can shadow stdlib names. Nothing here is special-cased by the
//! evaluator — the stdlib entries are ordinary registrations.

use std::cell::RefCell;
use std::collections::HashMap;

use rand::Rng;

use crate::error::EvalError;
use crate::eval::CallContext;
use crate::value::{fmt_number, Value};

/// A registry function. Implemented by any `FnMut(&CallContext, &[Value])`
/// closure and by the explicit stateful helper objects below.
pub trait Callable: Send {
    fn call(&mut self, ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError>;
}

impl<F> Callable for F
where
    F: FnMut(&CallContext<'_>, &[Value]) -> Result<Value, EvalError> + Send,
{
    fn call(&mut self, ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
        self(ctx, args)
    }
}

/// Name → callable mapping. Entries sit behind `RefCell` so calls can
/// mutate helper state (cyclers, caches) while the registry is shared
/// immutably across an evaluation.
pub struct FunctionRegistry {
    entries: HashMap<String, RefCell<Box<dyn Callable>>>,
}

impl FunctionRegistry {
    /// An empty registry with no built-ins.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// A registry seeded with the standard library.
    pub fn with_stdlib() -> Self {
        let mut registry = Self::empty();
        registry.register_stdlib();
        registry
    }

    /// Register a callable, overwriting any existing entry of that name
    /// (including built-ins).
    pub fn register<C: Callable + 'static>(&mut self, name: impl Into<String>, callable: C) {
        self.entries
            .insert(name.into(), RefCell::new(Box::new(callable)));
    }

    /// Register an already-boxed callable. Same overwrite semantics.
    pub fn register_boxed(&mut self, name: impl Into<String>, callable: Box<dyn Callable>) {
        self.entries.insert(name.into(), RefCell::new(callable));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Invoke a registered function. Re-entering the same entry (e.g.
    /// `once(once)`) is an error rather than a deadlock.
    pub fn call(
        &self,
        name: &str,
        ctx: &CallContext<'_>,
        args: &[Value],
    ) -> Result<Value, EvalError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        let mut callable = entry
            .try_borrow_mut()
            .map_err(|_| EvalError::Recursive(name.to_string()))?;
        callable.call(ctx, args)
    }

    // ── Standard library ───────────────────────────────────────────────

    fn register_stdlib(&mut self) {
        // 1. Value helpers
        self.register("px", unit_helper("px"));
        self.register("rem", unit_helper("rem"));
        self.register("em", unit_helper("em"));
        self.register("percent", percent);

        // 2. State-aware
        self.register("theme", theme);
        self.register("toggle", Cycler::new());

        // 3. One-shot helpers
        self.register("once", OnceCache::new());
        self.register("memo", MemoCache::new());

        // 4. Responsive
        self.register("media", media);
        self.register("breakpoint", breakpoint);

        // 5. Math helpers
        self.register("clamp", clamp);
        self.register("between", between);
        self.register("rand", rand_int);

        // 6. Color helpers
        self.register("darken", darken);
        self.register("lighten", lighten);
        self.register("alpha", alpha);
    }
}

// ── Stateful helper objects ────────────────────────────────────────────
//
// Each owns its private mutable state explicitly — one cycler index for
// `toggle`, one cache map per `once`/`memo` entry — so lifetime and reset
// semantics are testable in isolation.

/// Round-robin cycler backing `toggle(values...)`: each invocation returns
/// the next argument.
pub struct Cycler {
    index: usize,
}

impl Cycler {
    pub fn new() -> Self {
        Self { index: 0 }
    }
}

impl Default for Cycler {
    fn default() -> Self {
        Self::new()
    }
}

impl Callable for Cycler {
    fn call(&mut self, _ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
        if args.is_empty() {
            return Err(EvalError::arity("toggle", "at least 1", 0));
        }
        let value = args[self.index % args.len()].clone();
        self.index += 1;
        Ok(value)
    }
}

/// Compute-and-cache-forever backing `once(f, key?)`. The key defaults to
/// the function reference's own name.
pub struct OnceCache {
    cache: HashMap<String, Value>,
}

impl OnceCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }
}

impl Default for OnceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Callable for OnceCache {
    fn call(&mut self, ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
        let target = args
            .first()
            .ok_or_else(|| EvalError::arity("once", "1 or 2", 0))?;
        let key = match args.get(1) {
            Some(k) => k.to_text(),
            None => match target {
                Value::Function(name) => name.clone(),
                other => {
                    return Err(EvalError::type_error(format!(
                        "once() needs a function or an explicit key, got {}",
                        other.type_name()
                    )))
                }
            },
        };
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let value = ctx.invoke(target, &[])?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

/// Compute-and-cache-forever backing `memo(f, key?)`, keyed only by an
/// explicit key. With no key it recomputes — an unkeyed call has nothing to
/// look a previous result up by.
pub struct MemoCache {
    cache: HashMap<String, Value>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Callable for MemoCache {
    fn call(&mut self, ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
        let target = args
            .first()
            .ok_or_else(|| EvalError::arity("memo", "1 or 2", 0))?;
        match args.get(1) {
            None => ctx.invoke(target, &[]),
            Some(k) => {
                let key = k.to_text();
                if let Some(cached) = self.cache.get(&key) {
                    return Ok(cached.clone());
                }
                let value = ctx.invoke(target, &[])?;
                self.cache.insert(key, value.clone());
                Ok(value)
            }
        }
    }
}

// ── Value helpers ──────────────────────────────────────────────────────

fn unit_helper(unit: &'static str) -> impl Callable {
    move |_: &CallContext<'_>, args: &[Value]| -> Result<Value, EvalError> {
        let v = args
            .first()
            .ok_or_else(|| EvalError::arity(unit, "1", 0))?;
        Ok(Value::Str(format!("{}{unit}", v.to_text())))
    }
}

fn percent(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity("percent", "2", args.len()));
    }
    let v = args[0].as_num()?;
    let total = args[1].as_num()?;
    Ok(Value::Str(format!("{}%", fmt_number((v / total) * 100.0))))
}

// ── State-aware helpers ────────────────────────────────────────────────

fn theme(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity("theme", "2", args.len()));
    }
    let dark = matches!(ctx.state_get("theme"), Some(Value::Str(t)) if t == "dark");
    Ok(if dark { args[0].clone() } else { args[1].clone() })
}

// ── Responsive helpers ─────────────────────────────────────────────────

const BREAKPOINTS: &[(&str, &str)] = &[
    ("sm", "(max-width: 640px)"),
    ("md", "(max-width: 768px)"),
    ("lg", "(max-width: 1024px)"),
    ("xl", "(max-width: 1280px)"),
];

fn media(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity("media", "2", args.len()));
    }
    let query = args[0].as_str()?;
    if media_matches(query, ctx)? {
        Ok(args[1].clone())
    } else {
        Ok(Value::Null)
    }
}

fn breakpoint(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity("breakpoint", "2", args.len()));
    }
    let name = args[0].as_str()?;
    // Unknown names pass through as a raw query string.
    let query = BREAKPOINTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, q)| *q)
        .unwrap_or(name);
    if media_matches(query, ctx)? {
        Ok(args[1].clone())
    } else {
        Ok(Value::Null)
    }
}

/// Match a `(max-width: Npx)` / `(min-width: Npx)` query against the
/// numeric `viewport` state key.
fn media_matches(query: &str, ctx: &CallContext<'_>) -> Result<bool, EvalError> {
    let viewport = match ctx.state_get("viewport") {
        Some(Value::Num(n)) => *n,
        _ => {
            return Err(EvalError::type_error(
                "media queries need a numeric 'viewport' state key",
            ))
        }
    };

    let inner = query.trim().trim_start_matches('(').trim_end_matches(')');
    let (feature, value) = inner.split_once(':').ok_or_else(|| {
        EvalError::type_error(format!("unsupported media query '{query}'"))
    })?;
    let limit: f64 = value
        .trim()
        .trim_end_matches("px")
        .trim()
        .parse()
        .map_err(|_| EvalError::type_error(format!("bad media query value in '{query}'")))?;

    match feature.trim() {
        "max-width" => Ok(viewport <= limit),
        "min-width" => Ok(viewport >= limit),
        other => Err(EvalError::type_error(format!(
            "unsupported media feature '{other}'"
        ))),
    }
}

// ── Math helpers ───────────────────────────────────────────────────────

fn clamp(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 3 {
        return Err(EvalError::arity("clamp", "3", args.len()));
    }
    let (min, val, max) = (args[0].as_num()?, args[1].as_num()?, args[2].as_num()?);
    Ok(Value::Num(val.max(min).min(max)))
}

fn between(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 3 {
        return Err(EvalError::arity("between", "3", args.len()));
    }
    let (min, max, ratio) = (args[0].as_num()?, args[1].as_num()?, args[2].as_num()?);
    Ok(Value::Num(min + (max - min) * ratio))
}

fn rand_int(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity("rand", "2", args.len()));
    }
    let min = args[0].as_num()? as i64;
    let max = args[1].as_num()? as i64;
    if max < min {
        return Err(EvalError::type_error("rand: max is less than min"));
    }
    let n = rand::thread_rng().gen_range(min..=max);
    Ok(Value::Num(n as f64))
}

// ── Color helpers ──────────────────────────────────────────────────────

fn darken(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    let (color, percent) = color_args("darken", args)?;
    let [r, g, b] = parse_color(color)?;
    let channel = |c: f64| (c - (c * percent) / 100.0).max(0.0);
    Ok(Value::Str(rgb(channel(r), channel(g), channel(b))))
}

fn lighten(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    let (color, percent) = color_args("lighten", args)?;
    let [r, g, b] = parse_color(color)?;
    let channel = |c: f64| (c + (255.0 - c) * (percent / 100.0)).min(255.0);
    Ok(Value::Str(rgb(channel(r), channel(g), channel(b))))
}

fn alpha(_: &CallContext<'_>, args: &[Value]) -> Result<Value, EvalError> {
    let (color, a) = color_args("alpha", args)?;
    let [r, g, b] = parse_color(color)?;
    Ok(Value::Str(format!(
        "rgba({}, {}, {}, {})",
        fmt_number(r),
        fmt_number(g),
        fmt_number(b),
        fmt_number(a)
    )))
}

fn color_args<'a>(name: &str, args: &'a [Value]) -> Result<(&'a str, f64), EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity(name, "2", args.len()));
    }
    Ok((args[0].as_str()?, args[1].as_num()?))
}

fn rgb(r: f64, g: f64, b: f64) -> String {
    format!("rgb({}, {}, {})", fmt_number(r), fmt_number(g), fmt_number(b))
}

/// Parse a `#rgb`/`#rrggbb` hex literal or an `rgb(r, g, b)` literal into
/// channel values. Malformed input is an evaluation error.
fn parse_color(color: &str) -> Result<[f64; 3], EvalError> {
    let color = color.trim();

    if let Some(hex) = color.strip_prefix('#') {
        let expanded: String = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect()
        } else {
            hex.to_string()
        };
        if expanded.len() != 6 {
            return Err(EvalError::type_error(format!("bad hex color '{color}'")));
        }
        let packed = u32::from_str_radix(&expanded, 16)
            .map_err(|_| EvalError::type_error(format!("bad hex color '{color}'")))?;
        return Ok([
            ((packed >> 16) & 255) as f64,
            ((packed >> 8) & 255) as f64,
            (packed & 255) as f64,
        ]);
    }

    // `rgb(r, g, b)` or anything containing three integer runs.
    let mut channels = Vec::with_capacity(3);
    let mut digits = String::new();
    for c in color.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if !digits.is_empty() {
            channels.push(digits.parse::<f64>().unwrap_or(0.0));
            digits.clear();
        }
    }
    if channels.len() < 3 {
        return Err(EvalError::type_error(format!("bad color literal '{color}'")));
    }
    Ok([channels[0], channels[1], channels[2]])
}
