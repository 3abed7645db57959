use std::{fmt, rc::Rc, time::Duration};

use evidence_lang::{
    ast::{Function, Param},
    Host, Kwargs, Module, RuntimeError, Value,
};
use serde::Serialize;

use crate::{
    bundle::{ObligationBundle, Predicate, PurityConfig, ReferenceSpec},
    error::{CallError, ContractViolation},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub module: String,
    pub name: String,
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type NativeFn = Rc<dyn Fn(&Kwargs) -> Result<Value, RuntimeError>>;

/// Something that can be invoked with named arguments.
#[derive(Clone)]
pub enum Callable {
    /// An IR function bound to a module namespace. Introspectable.
    Interpreted {
        module: Module,
        function: Rc<Function>,
    },
    /// Opaque Rust code.
    Native(NativeFn),
}

impl Callable {
    pub fn native(f: impl Fn(&Kwargs) -> Result<Value, RuntimeError> + 'static) -> Callable {
        Callable::Native(Rc::new(f))
    }

    pub fn invoke(&self, kwargs: &Kwargs) -> Result<Value, RuntimeError> {
        match self {
            Callable::Interpreted { module, function } => module.call(function, kwargs),
            Callable::Native(f) => f(kwargs),
        }
    }

    /// Like [`Callable::invoke`], giving up with
    /// [`RuntimeError::DeadlineExceeded`] once `deadline` has passed.
    /// Native code cannot be interrupted and runs to completion.
    pub fn invoke_within(
        &self,
        kwargs: &Kwargs,
        deadline: Option<Duration>,
    ) -> Result<Value, RuntimeError> {
        match self {
            Callable::Interpreted { module, .. } => {
                module.host().with_deadline(deadline, || self.invoke(kwargs))
            }
            Callable::Native(f) => f(kwargs),
        }
    }

    pub fn function(&self) -> Option<&Function> {
        match self {
            Callable::Interpreted { function, .. } => Some(function),
            Callable::Native(_) => None,
        }
    }
    pub fn module(&self) -> Option<&Module> {
        match self {
            Callable::Interpreted { module, .. } => Some(module),
            Callable::Native(_) => None,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Interpreted { module, function } => {
                write!(f, "Interpreted({}.{})", module.name(), function.name)
            }
            Callable::Native(_) => write!(f, "Native"),
        }
    }
}

/// A function under verification together with its obligations.
#[derive(Debug, Clone)]
pub struct SubjectFunction {
    name: QualifiedName,
    params: Vec<Param>,
    callable: Callable,
    module: Module,
    bundle: ObligationBundle,
}

impl SubjectFunction {
    /// Defines `function` in `module` and wraps it.
    pub fn interpreted(module: &Module, function: Function) -> SubjectFunction {
        let params = function.params.clone();
        let function = module.define(function);
        SubjectFunction {
            name: QualifiedName {
                module: module.name().to_string(),
                name: function.name.0.clone(),
            },
            params,
            callable: Callable::Interpreted {
                module: module.clone(),
                function,
            },
            module: module.clone(),
            bundle: ObligationBundle::default(),
        }
    }

    /// Wraps opaque Rust code. Expression predicates on it are evaluated in
    /// `module`.
    pub fn native(
        module: &Module,
        name: &str,
        params: impl IntoIterator<Item = Param>,
        f: impl Fn(&Kwargs) -> Result<Value, RuntimeError> + 'static,
    ) -> SubjectFunction {
        SubjectFunction {
            name: QualifiedName {
                module: module.name().to_string(),
                name: name.to_string(),
            },
            params: params.into_iter().collect(),
            callable: Callable::native(f),
            module: module.clone(),
            bundle: ObligationBundle::default(),
        }
    }

    pub fn requires(mut self, predicate: impl Into<Predicate>) -> Self {
        self.bundle.requires.push(predicate.into());
        self
    }
    pub fn requires_fn(self, name: &str, f: impl Fn(&Kwargs) -> bool + 'static) -> Self {
        self.requires(Predicate::native(name, move |args, _| Ok(f(args))))
    }
    pub fn ensures(mut self, predicate: impl Into<Predicate>) -> Self {
        self.bundle.ensures.push(predicate.into());
        self
    }
    pub fn ensures_fn(self, name: &str, f: impl Fn(&Kwargs, &Value) -> bool + 'static) -> Self {
        self.ensures(Predicate::native(name, move |args, result| {
            Ok(result.is_some_and(|r| f(args, r)))
        }))
    }
    pub fn against(mut self, spec: ReferenceSpec) -> Self {
        self.bundle.spec = Some(spec);
        self
    }
    pub fn pure(self) -> Self {
        self.pure_with(PurityConfig::strict())
    }
    pub fn pure_with(mut self, config: PurityConfig) -> Self {
        self.bundle.purity = Some(config);
        self
    }
    /// Marks this function as a trusted implementation: it is not verified
    /// itself and can serve as a [`ReferenceSpec`] for others.
    pub fn reference_only(mut self) -> Self {
        self.bundle.reference_only = true;
        self
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }
    pub fn params(&self) -> &[Param] {
        &self.params
    }
    pub fn callable(&self) -> &Callable {
        &self.callable
    }
    pub fn module(&self) -> &Module {
        &self.module
    }
    pub fn host(&self) -> &Rc<Host> {
        self.module.host()
    }
    pub fn bundle(&self) -> &ObligationBundle {
        &self.bundle
    }

    /// The same function and obligations with a different body.
    pub fn with_callable(&self, callable: Callable) -> SubjectFunction {
        SubjectFunction {
            callable,
            ..self.clone()
        }
    }

    pub fn check_requires(&self, args: &Kwargs) -> Result<(), ContractViolation> {
        for (index, p) in self.bundle.requires.iter().enumerate() {
            p.check(&self.module, args, None)
                .map_err(|message| ContractViolation::Precondition {
                    function: self.name.clone(),
                    index,
                    message,
                })?;
        }
        Ok(())
    }
    pub fn check_ensures(&self, args: &Kwargs, result: &Value) -> Result<(), ContractViolation> {
        for (index, p) in self.bundle.ensures.iter().enumerate() {
            p.check(&self.module, args, Some(result))
                .map_err(|message| ContractViolation::Postcondition {
                    function: self.name.clone(),
                    index,
                    message,
                })?;
        }
        Ok(())
    }

    /// Invokes the body without checking any contract.
    pub fn invoke(&self, args: &Kwargs) -> Result<Value, RuntimeError> {
        self.callable.invoke(args)
    }

    /// Invokes the body with preconditions checked before and
    /// postconditions after.
    pub fn call(&self, args: &Kwargs) -> Result<Value, CallError> {
        self.check_requires(args)?;
        let result = self.invoke(args)?;
        self.check_ensures(args, &result)?;
        Ok(result)
    }
}

/// A collection of subject functions sharing a namespace.
#[derive(Debug, Clone)]
pub struct SubjectModule {
    module: Module,
    functions: Vec<SubjectFunction>,
}

impl SubjectModule {
    pub fn new(module: Module) -> SubjectModule {
        SubjectModule {
            module,
            functions: Vec::new(),
        }
    }
    pub fn with(mut self, function: SubjectFunction) -> Self {
        self.functions.push(function);
        self
    }
    pub fn push(&mut self, function: SubjectFunction) {
        self.functions.push(function);
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }
    pub fn module(&self) -> &Module {
        &self.module
    }
    pub fn functions(&self) -> &[SubjectFunction] {
        &self.functions
    }
    /// Looks up a function by its unqualified name.
    pub fn get(&self, name: &str) -> Option<&SubjectFunction> {
        self.functions.iter().find(|f| f.name.name == name)
    }
}

/// Independent copies of every argument.
pub fn copy_args(args: &Kwargs) -> Kwargs {
    args.iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect()
}

pub fn args_json(args: &Kwargs) -> serde_json::Value {
    serde_json::Value::Object(args.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}
