use std::{cell::RefCell, collections::BTreeSet, rc::Rc, time::Instant};

use indexmap::IndexMap;

use crate::{
    ast::{Block, Expr, Function, LogicOp, StmtKind, Target},
    builtins::{call_method, Builtin, BuiltinCtx},
    host::{Host, Limits},
    semantics::{self, RuntimeError},
    value::{Kwargs, Shared, Value},
};

/// A namespace of global bindings together with the host it runs against.
///
/// Cloning a [`Module`] shares its namespace; [`Module::isolate`] does not.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    globals: Shared<IndexMap<String, Value>>,
    host: Rc<Host>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_host(name, Rc::new(Host::default()))
    }
    pub fn with_host(name: impl Into<String>, host: Rc<Host>) -> Self {
        Self {
            name: name.into(),
            globals: Rc::new(RefCell::new(IndexMap::new())),
            host,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn host(&self) -> &Rc<Host> {
        &self.host
    }
    pub fn globals(&self) -> &Shared<IndexMap<String, Value>> {
        &self.globals
    }

    /// Binds `function` under its own name and returns the shared definition.
    pub fn define(&self, function: Function) -> Rc<Function> {
        let function = Rc::new(function);
        self.set(&function.name.0, Value::Function(function.clone()));
        function
    }
    pub fn set(&self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }
    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }
    pub fn function(&self, name: &str) -> Option<Rc<Function>> {
        match self.get(name)? {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// A copy whose namespace shares no mutable state with this one.
    pub fn isolate(&self) -> Module {
        let globals = self
            .globals
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.deep_copy()))
            .collect();
        Module {
            name: self.name.clone(),
            globals: Rc::new(RefCell::new(globals)),
            host: self.host.clone(),
        }
    }

    /// Calls `function` with arguments bound by parameter name. Missing
    /// arguments take their declared default.
    pub fn call(&self, function: &Function, kwargs: &Kwargs) -> Result<Value, RuntimeError> {
        let mut args = Vec::with_capacity(function.params.len());
        for p in &function.params {
            match (kwargs.get(&p.name.0), &p.default) {
                (Some(v), _) => args.push(v.clone()),
                (None, Some(default)) => args.push(default.clone()),
                (None, None) => {
                    return Err(RuntimeError::Arity {
                        function: function.name.0.clone(),
                        message: format!("missing required argument: '{}'", p.name),
                    })
                }
            }
        }
        if let Some(unknown) = kwargs
            .keys()
            .find(|k| !function.params.iter().any(|p| &p.name.0 == *k))
        {
            return Err(RuntimeError::Arity {
                function: function.name.0.clone(),
                message: format!("got an unexpected keyword argument '{unknown}'"),
            });
        }
        Interpreter::new(self).call_function(function, args)
    }

    pub fn call_value(&self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        Interpreter::new(self).call_value(callee, args)
    }

    /// Evaluates `expr` with `locals` bound on top of the module globals.
    pub fn eval(&self, expr: &Expr, locals: &Kwargs) -> Result<Value, RuntimeError> {
        let mut frame = Frame::default();
        frame.locals.extend(locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        Interpreter::new(self).eval(&mut frame, expr)
    }
}

#[derive(Debug, Default)]
struct Frame {
    locals: IndexMap<String, Value>,
    global_names: BTreeSet<String>,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Interpreter<'m> {
    module: &'m Module,
    limits: Limits,
    steps: u64,
    depth: usize,
}

impl<'m> Interpreter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            limits: module.host.limits(),
            steps: 0,
            depth: 0,
        }
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            tracing::debug!(steps = self.steps, module = %self.module.name, "out of fuel");
            return Err(RuntimeError::FuelExhausted { steps: self.steps });
        }
        if self.steps % 256 == 0 {
            if let Some(deadline) = self.limits.deadline {
                if Instant::now() >= deadline {
                    return Err(RuntimeError::DeadlineExceeded);
                }
            }
        }
        Ok(())
    }

    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(f) => self.call_function(f, args),
            Value::Builtin(b) => b.call(
                &BuiltinCtx {
                    host: &self.module.host,
                    globals: &self.module.globals,
                },
                args,
            ),
            v => Err(RuntimeError::NotCallable { ty: v.type_name() }),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let params = &function.params;
        if args.len() > params.len() {
            return Err(RuntimeError::Arity {
                function: function.name.0.clone(),
                message: format!(
                    "takes {} positional arguments but {} were given",
                    params.len(),
                    args.len()
                ),
            });
        }
        let mut frame = Frame::default();
        let given = args.len();
        for (p, v) in params.iter().zip(args) {
            frame.locals.insert(p.name.0.clone(), v);
        }
        for p in &params[given..] {
            let default = p.default.as_ref().ok_or_else(|| RuntimeError::Arity {
                function: function.name.0.clone(),
                message: format!("missing required argument: '{}'", p.name),
            })?;
            frame.locals.insert(p.name.0.clone(), default.clone());
        }

        if self.depth >= self.limits.max_depth {
            return Err(RuntimeError::RecursionLimit {
                depth: self.limits.max_depth,
            });
        }
        self.depth += 1;
        let flow = self.exec_block(&mut frame, &function.body);
        self.depth -= 1;
        match flow? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, block: &Block) -> Result<Flow, RuntimeError> {
        for stmt in block {
            self.tick()?;
            let flow = match &stmt.kind {
                StmtKind::Assign(target, expr) => {
                    let value = self.eval(frame, expr)?;
                    self.assign(frame, target, value)?;
                    Flow::Normal
                }
                StmtKind::Expr(e) => {
                    self.eval(frame, e)?;
                    Flow::Normal
                }
                StmtKind::If(cond, then, otherwise) => {
                    if self.eval(frame, cond)?.truthy() {
                        self.exec_block(frame, then)?
                    } else {
                        self.exec_block(frame, otherwise)?
                    }
                }
                StmtKind::While(cond, body) => {
                    let mut flow = Flow::Normal;
                    while self.eval(frame, cond)?.truthy() {
                        self.tick()?;
                        match self.exec_block(frame, body)? {
                            Flow::Break => break,
                            Flow::Return(v) => {
                                flow = Flow::Return(v);
                                break;
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                    }
                    flow
                }
                StmtKind::For(var, iter, body) => {
                    let mut flow = Flow::Normal;
                    for item in self.eval(frame, iter)?.elements()? {
                        self.tick()?;
                        self.assign(frame, &Target::Name(var.clone()), item)?;
                        match self.exec_block(frame, body)? {
                            Flow::Break => break,
                            Flow::Return(v) => {
                                flow = Flow::Return(v);
                                break;
                            }
                            Flow::Normal | Flow::Continue => {}
                        }
                    }
                    flow
                }
                StmtKind::Return(e) => Flow::Return(match e {
                    Some(e) => self.eval(frame, e)?,
                    None => Value::None,
                }),
                StmtKind::Break => Flow::Break,
                StmtKind::Continue => Flow::Continue,
                StmtKind::Pass => Flow::Normal,
                StmtKind::Global(names) => {
                    frame
                        .global_names
                        .extend(names.iter().map(|n| n.0.clone()));
                    Flow::Normal
                }
                StmtKind::Def(f) => {
                    let value = Value::Function(Rc::new((**f).clone()));
                    self.assign(frame, &Target::Name(f.name.clone()), value)?;
                    Flow::Normal
                }
            };
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, frame: &mut Frame, target: &Target, value: Value) -> Result<(), RuntimeError> {
        match target {
            Target::Name(n) if frame.global_names.contains(&n.0) => {
                self.module.set(&n.0, value);
            }
            Target::Name(n) => {
                frame.locals.insert(n.0.clone(), value);
            }
            Target::Unpack(names) => {
                let items = value.elements()?;
                if items.len() != names.len() {
                    return Err(RuntimeError::ValueError {
                        message: format!(
                            "expected {} values to unpack, got {}",
                            names.len(),
                            items.len()
                        ),
                    });
                }
                for (n, v) in names.iter().zip(items) {
                    self.assign(frame, &Target::Name(n.clone()), v)?;
                }
            }
            Target::Index(base, idx) => {
                let base = self.eval(frame, base)?;
                let idx = self.eval(frame, idx)?;
                semantics::set_item(&base, &idx, value)?;
            }
            Target::Attr(base, attr) => {
                let base = self.eval(frame, base)?;
                semantics::set_attribute(&base, &attr.0, value)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, frame: &Frame, name: &str) -> Result<Value, RuntimeError> {
        if !frame.global_names.contains(name) {
            if let Some(v) = frame.locals.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.module.get(name) {
            return Ok(v);
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::NameNotFound {
                name: name.to_string(),
            })
    }

    fn is_bound(&self, frame: &Frame, name: &str) -> bool {
        frame.locals.contains_key(name) || self.module.get(name).is_some()
    }

    /// Resolves `random.randint` style references that name a builtin through
    /// an unbound module prefix.
    fn qualified_builtin(&self, frame: &Frame, expr: &Expr) -> Option<Builtin> {
        let dotted = expr.dotted_name()?;
        let root = dotted.split('.').next()?;
        if self.is_bound(frame, root) {
            return None;
        }
        Builtin::lookup(&dotted)
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, RuntimeError> {
        Ok(match expr {
            Expr::Const(lit) => Value::from(lit),
            Expr::Name(n) => self.lookup(frame, &n.0)?,
            Expr::Attr(base, attr) => match self.qualified_builtin(frame, expr) {
                Some(b) => Value::Builtin(b),
                None => {
                    let base = self.eval(frame, base)?;
                    semantics::attribute(&base, &attr.0)?
                }
            },
            Expr::Call(callee, args) => {
                let method = match &**callee {
                    Expr::Attr(base, method) if self.qualified_builtin(frame, callee).is_none() => {
                        Some((base, method))
                    }
                    _ => None,
                };
                match method {
                    Some((base, method)) => {
                        let receiver = self.eval(frame, base)?;
                        let args = self.eval_all(frame, args)?;
                        match &receiver {
                            Value::Record(r) if r.borrow().fields.contains_key(&method.0) => {
                                let f = semantics::attribute(&receiver, &method.0)?;
                                self.call_value(&f, args)?
                            }
                            _ => call_method(&receiver, &method.0, args)?,
                        }
                    }
                    None => {
                        let f = self.eval(frame, callee)?;
                        let args = self.eval_all(frame, args)?;
                        self.call_value(&f, args)?
                    }
                }
            }
            Expr::Binary(l, op, r) => {
                let l = self.eval(frame, l)?;
                let r = self.eval(frame, r)?;
                op.semantic(&l, &r)?
            }
            Expr::Unary(op, e) => {
                let v = self.eval(frame, e)?;
                op.semantic(&v)?
            }
            Expr::Compare(l, op, r) => {
                let l = self.eval(frame, l)?;
                let r = self.eval(frame, r)?;
                Value::Bool(op.semantic(&l, &r)?)
            }
            Expr::Logic(l, op, r) => {
                let l = self.eval(frame, l)?;
                match (op, l.truthy()) {
                    (LogicOp::And, false) | (LogicOp::Or, true) => l,
                    _ => self.eval(frame, r)?,
                }
            }
            Expr::Index(base, idx) => {
                let base = self.eval(frame, base)?;
                let idx = self.eval(frame, idx)?;
                semantics::subscript(&base, &idx)?
            }
            Expr::List(items) => Value::list(self.eval_all(frame, items)?),
            Expr::Tuple(items) => Value::tuple(self.eval_all(frame, items)?),
            Expr::Set(items) => {
                let items = self.eval_all(frame, items)?;
                items.iter().try_for_each(semantics::require_hashable)?;
                Value::set(items)
            }
            Expr::Dict(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let k = self.eval(frame, k)?;
                    semantics::require_hashable(&k)?;
                    pairs.push((k, self.eval(frame, v)?));
                }
                Value::map(pairs)
            }
            Expr::Cond(then, test, otherwise) => {
                if self.eval(frame, test)?.truthy() {
                    self.eval(frame, then)?
                } else {
                    self.eval(frame, otherwise)?
                }
            }
        })
    }

    fn eval_all(&mut self, frame: &mut Frame, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval(frame, e)).collect()
    }
}
