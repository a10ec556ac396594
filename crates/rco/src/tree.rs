//! # Host Value Tree
//!
//! The values handlers receive and return. Identical to the wire tree except that
//! functions appear as live callables instead of placeholders.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Outcome of invoking a function: the returned value, or the thrown value verbatim.
pub type CallResult = std::result::Result<Tree, Tree>;

/// Something that can be invoked with a list of arguments.
///
/// Implemented by local closures (see `Function::new`) and by the proxies a context
/// generates for functions owned by its peer.
#[async_trait::async_trait]
pub trait Callable: Send + Sync + 'static {
    async fn call(&self, args: Vec<Tree>) -> CallResult;
}

/// A cheaply clonable function value.
///
/// Clones share identity, which is what lets a function that appears twice in one
/// tree travel as a single handle.
#[derive(Clone)]
pub struct Function {
    inner: Arc<dyn Callable>,
}

struct Closure<F>(F);

#[async_trait::async_trait]
impl<F, Fut> Callable for Closure<F>
where
    F: Fn(Vec<Tree>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    async fn call(&self, args: Vec<Tree>) -> CallResult {
        (self.0)(args).await
    }
}

impl Function {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Tree>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        Self { inner: Arc::new(Closure(f)) }
    }

    /// Wraps a plain closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Tree>) -> CallResult + Send + Sync + 'static,
    {
        Self::new(move |args| futures::future::ready(f(args)))
    }

    pub(crate) fn from_callable(inner: Arc<dyn Callable>) -> Self {
        Self { inner }
    }

    /// Invokes the function.
    pub async fn call(&self, args: Vec<Tree>) -> CallResult {
        self.inner.call(args).await
    }

    /// True if both values are clones of the same function.
    pub fn ptr_eq(a: &Function, b: &Function) -> bool {
        a.addr() == b.addr()
    }

    /// Thin address of the shared callable, used as its identity.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Function::ptr_eq(self, other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:#x})", self.addr())
    }
}

/// A node of the host value tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Sequence(Vec<Tree>),
    /// Insertion-ordered key/value pairs.
    Mapping(Vec<(String, Tree)>),
    Function(Function),
}

impl Tree {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tree::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Tree::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tree::Null)
    }

    /// Looks up a key in a `Mapping`.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Takes the first element of an argument list, or `Null` if there is none.
    pub fn first(args: Vec<Tree>) -> Tree {
        args.into_iter().next().unwrap_or(Tree::Null)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::Null => write!(f, "null"),
            Tree::Bool(b) => write!(f, "{}", b),
            Tree::Number(n) => write!(f, "{}", n),
            Tree::Text(s) => write!(f, "{}", s),
            Tree::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Tree::Mapping(entries) => {
                write!(f, "{{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                write!(f, "}}")
            }
            Tree::Function(_) => write!(f, "[function]"),
        }
    }
}

impl From<bool> for Tree {
    fn from(v: bool) -> Self { Tree::Bool(v) }
}

impl From<f64> for Tree {
    fn from(v: f64) -> Self { Tree::Number(v) }
}

impl From<i32> for Tree {
    fn from(v: i32) -> Self { Tree::Number(v as f64) }
}

impl From<u32> for Tree {
    fn from(v: u32) -> Self { Tree::Number(v as f64) }
}

impl From<&str> for Tree {
    fn from(v: &str) -> Self { Tree::Text(v.to_string()) }
}

impl From<String> for Tree {
    fn from(v: String) -> Self { Tree::Text(v) }
}

impl From<Vec<Tree>> for Tree {
    fn from(v: Vec<Tree>) -> Self { Tree::Sequence(v) }
}

impl From<Function> for Tree {
    fn from(v: Function) -> Self { Tree::Function(v) }
}
