//! The verification orchestrator.

use std::{collections::BTreeSet, time::Instant};

use evidence_lang::{Host, Kwargs, Limits};
use serde_json::json;

use crate::{
    bundle::PurityConfig,
    collab::{
        Collaborators, CoverageService, PropertyInference, ProofOutcome, SuggestionService,
        SymbolicBackend,
    },
    config::VerifyConfig,
    equiv::{examine, Equivalence, Examination},
    error::{Error, Result},
    gn::{GeneratorRegistry, KwargsStrategy, Synthesis},
    mutate,
    purity::{self, DynamicOutcome},
    report::{ModuleReport, ObligationKind, ObligationResult, Status, TrustSummary, TrustedFunction},
    search::Search,
    subject::{args_json, copy_args, QualifiedName, SubjectFunction, SubjectModule},
};

type Outcome = (Status, serde_json::Value);

/// Runs every obligation of every function in a module.
pub struct Verifier {
    config: VerifyConfig,
    registry: GeneratorRegistry,
    collaborators: Collaborators,
}

struct Recorder<'a> {
    results: Vec<ObligationResult>,
    on_result: &'a mut dyn FnMut(&ObligationResult),
}

impl Recorder<'_> {
    fn record(
        &mut self,
        function: &QualifiedName,
        obligation: ObligationKind,
        started: Instant,
        (status, details): Outcome,
    ) {
        let result = ObligationResult {
            function: function.clone(),
            obligation,
            status,
            details,
            duration: started.elapsed(),
        };
        tracing::debug!(%obligation, %status, "obligation checked");
        (self.on_result)(&result);
        self.results.push(result);
    }
}

/// Generators for one function: the full-size one and the one bounded for
/// single small examples.
struct Generators {
    full: KwargsStrategy,
    smoke: KwargsStrategy,
    degraded: BTreeSet<String>,
}

impl Verifier {
    pub fn new(config: VerifyConfig) -> Verifier {
        Verifier {
            config,
            registry: GeneratorRegistry::default(),
            collaborators: Collaborators::default(),
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }
    pub fn registry_mut(&mut self) -> &mut GeneratorRegistry {
        &mut self.registry
    }
    pub fn with_registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = registry;
        self
    }
    pub fn with_coverage(mut self, service: impl CoverageService + 'static) -> Self {
        self.collaborators.coverage = Some(Box::new(service));
        self
    }
    pub fn with_symbolic(mut self, backend: impl SymbolicBackend + 'static) -> Self {
        self.collaborators.symbolic = Some(Box::new(backend));
        self
    }
    pub fn with_inference(mut self, inference: impl PropertyInference + 'static) -> Self {
        self.collaborators.inference = Some(Box::new(inference));
        self
    }
    pub fn with_suggestions(mut self, service: impl SuggestionService + 'static) -> Self {
        self.collaborators.suggestions = Some(Box::new(service));
        self
    }

    fn search(&self) -> Search {
        Search::new(self.config.seed)
    }

    /// Verifies every function of `module`, handing each result to
    /// `on_result` as soon as it is known.
    pub fn verify_module(
        &self,
        module: &SubjectModule,
        mut on_result: impl FnMut(&ObligationResult),
    ) -> ModuleReport {
        let span = tracing::info_span!("verify", module = module.name());
        let _guard = span.enter();

        let mut recorder = Recorder {
            results: Vec::new(),
            on_result: &mut on_result,
        };
        let mut trusted = Vec::new();

        for subject in module.functions() {
            let name = subject.name();
            if subject.bundle().reference_only {
                tracing::debug!(function = %name, "reference implementation, not verified");
                recorder.record(
                    name,
                    ObligationKind::EquivToSpec,
                    Instant::now(),
                    (
                        Status::Skip,
                        json!({ "reason": "reference implementation, not verified itself" }),
                    ),
                );
                continue;
            }

            self.verify_function(subject, &mut recorder);
            trusted.push(TrustedFunction {
                function: name.clone(),
            });
        }

        let report = ModuleReport {
            results: recorder.results,
            trust: TrustSummary {
                module: module.name().to_string(),
                timestamp: chrono::Utc::now(),
                functions: trusted,
            },
        };
        tracing::info!(summary = %report.summary(), "verified module");
        report
    }

    fn generators(&self, subject: &SubjectFunction) -> Result<Generators> {
        let policy = self.config.unknown_types;
        let mut smoke = Synthesis::new(&self.registry, self.config.smoke_max_list_size, policy);
        let smoke_strategy = smoke.kwargs(subject.params())?;
        let mut full = Synthesis::new(&self.registry, self.config.max_list_size, policy);
        let full_strategy = full.kwargs(subject.params())?;
        Ok(Generators {
            full: full_strategy,
            smoke: smoke_strategy,
            degraded: smoke.degraded().clone(),
        })
    }

    /// A minimal input satisfying the preconditions, from the small
    /// generator.
    fn satisfying_example(
        &self,
        subject: &SubjectFunction,
        smoke: &KwargsStrategy,
    ) -> Result<Option<Kwargs>> {
        self.search()
            .find(smoke, self.config.search_attempts, |args| {
                subject.check_requires(args).is_ok()
            })
    }

    fn verify_function(&self, subject: &SubjectFunction, recorder: &mut Recorder<'_>) {
        let name = subject.name();
        let span = tracing::info_span!("function", name = %name);
        let _guard = span.enter();
        tracing::info!("verifying function");

        let fuel = self.config.fuel;
        let spec_host = subject
            .bundle()
            .spec
            .as_ref()
            .and_then(|s| s.callable.module())
            .map(|m| m.host());
        with_fuel(subject.host(), fuel, || match spec_host {
            Some(host) => with_fuel(host, fuel, || self.check_obligations(subject, recorder)),
            None => self.check_obligations(subject, recorder),
        });
    }

    fn check_obligations(&self, subject: &SubjectFunction, recorder: &mut Recorder<'_>) {
        let name = subject.name();
        let bundle = subject.bundle();
        let started = Instant::now();
        let generators = match self.generators(subject) {
            Ok(g) => g,
            Err(e) => {
                recorder.record(
                    name,
                    ObligationKind::ContractsSmoke,
                    started,
                    (Status::Error, json!({ "error": e.to_string() })),
                );
                return;
            }
        };

        let example = match self.satisfying_example(subject, &generators.smoke) {
            Ok(Some(example)) => example,
            Ok(None) => {
                recorder.record(
                    name,
                    ObligationKind::RequiresSatisfiable,
                    started,
                    (
                        Status::Fail,
                        json!({
                            "error": "no satisfying input found",
                            "attempts": self.config.search_attempts,
                        }),
                    ),
                );
                recorder.record(
                    name,
                    ObligationKind::EquivToSpec,
                    Instant::now(),
                    (Status::Skip, json!({ "reason": "preconditions unsatisfiable" })),
                );
                return;
            }
            Err(e) => {
                recorder.record(
                    name,
                    ObligationKind::ContractsSmoke,
                    started,
                    (Status::Error, json!({ "error": e.to_string() })),
                );
                return;
            }
        };
        let (kind, outcome) = smoke(subject, &example, &generators.degraded);
        recorder.record(name, kind, started, outcome);

        if let Some(config) = &bundle.purity {
            let started = Instant::now();
            recorder.record(
                name,
                ObligationKind::PureStatic,
                started,
                static_purity(subject, config),
            );
            let started = Instant::now();
            recorder.record(
                name,
                ObligationKind::PureDynamic,
                started,
                dynamic_purity(subject, config, &example),
            );
        }

        let started = Instant::now();
        let outcome = match &bundle.spec {
            None => (
                Status::Skip,
                json!({ "reason": "no reference spec attached" }),
            ),
            Some(spec) => Equivalence {
                subject,
                spec,
                search: self.search(),
                attempts: self.config.search_attempts,
            }
            .check(&generators.full),
        };
        recorder.record(name, ObligationKind::EquivToSpec, started, outcome);

        let features = self.config.features;
        if features.mutation {
            let started = Instant::now();
            let outcome = self.mutation(subject, &generators.smoke);
            recorder.record(name, ObligationKind::MutationScore, started, outcome);
        }
        if features.coverage {
            let started = Instant::now();
            let outcome = match &self.collaborators.coverage {
                None => unavailable("coverage service"),
                Some(service) => match service.measure(subject, std::slice::from_ref(&example)) {
                    Ok(report) => (Status::Pass, json!({ "report": report })),
                    Err(error) => (Status::Error, json!({ "error": error })),
                },
            };
            recorder.record(name, ObligationKind::Coverage, started, outcome);
        }
        if features.prove {
            let started = Instant::now();
            let outcome = match &self.collaborators.symbolic {
                None => unavailable("symbolic backend"),
                Some(backend) => match backend.prove(subject) {
                    ProofOutcome::Verified { detail } => (Status::Pass, json!({ "detail": detail })),
                    ProofOutcome::Disproved { counterexample } => (
                        Status::Fail,
                        json!({ "counterexample": counterexample }),
                    ),
                    ProofOutcome::Inconclusive { reason } | ProofOutcome::Unavailable { reason } => {
                        (Status::Skip, json!({ "reason": reason }))
                    }
                },
            };
            recorder.record(name, ObligationKind::SymbolicProof, started, outcome);
        }
        if features.infer {
            let started = Instant::now();
            let outcome = match &self.collaborators.inference {
                None => unavailable("property inference"),
                Some(inference) => {
                    let found = inference.infer(subject);
                    let (holding, not_holding): (Vec<_>, Vec<_>) =
                        found.iter().partition(|p| p.holds);
                    let status = if holding.is_empty() {
                        Status::Skip
                    } else {
                        Status::Pass
                    };
                    (
                        status,
                        json!({
                            "properties_found": found.len(),
                            "properties_rejected": not_holding.len(),
                            "holding": holding.iter().map(|p| &p.name).collect::<Vec<_>>(),
                            "not_holding": not_holding.iter().map(|p| &p.name).collect::<Vec<_>>(),
                        }),
                    )
                }
            };
            recorder.record(name, ObligationKind::InferredProperties, started, outcome);
        }
        if features.suggest {
            let started = Instant::now();
            let outcome = match &self.collaborators.suggestions {
                None => unavailable("suggestion service"),
                Some(service) => {
                    let suggestions = service.suggest(subject);
                    let status = if suggestions.is_empty() {
                        Status::Skip
                    } else {
                        Status::Pass
                    };
                    (status, json!({ "suggestions": suggestions }))
                }
            };
            recorder.record(name, ObligationKind::SpecSuggestions, started, outcome);
        }
    }

    /// Scores the mutants of `subject`. Each mutant is run on a fresh small
    /// example and killed when a postcondition fails, the spec disagrees or
    /// the invocation raises.
    fn mutation(&self, subject: &SubjectFunction, smoke: &KwargsStrategy) -> Outcome {
        if subject.callable().function().is_none() {
            return (
                Status::Skip,
                json!({ "reason": "no introspectable body to mutate" }),
            );
        }
        let spec = subject.bundle().spec.as_ref();
        let report = mutate::run(subject.callable(), self.config.max_mutants, |mutant| {
            let example = self
                .satisfying_example(subject, smoke)?
                .ok_or_else(|| Error::Search {
                    reason: "no satisfying input found".to_string(),
                })?;
            // Without a deadline a slow mutant is only stopped by fuel, which raises.
            match examine(&subject.with_callable(mutant.clone()), spec, &example, None) {
                Examination::Holds => Ok(false),
                Examination::Violated(_) | Examination::Inconclusive => Ok(true),
                Examination::Rejected => Err(Error::Search {
                    reason: "example no longer satisfies the preconditions".to_string(),
                }),
            }
        });
        let threshold = self.config.mutation_threshold;
        let status = match report.mutation_score {
            None => Status::Skip,
            Some(score) if score >= threshold => Status::Pass,
            Some(_) => Status::Fail,
        };
        let mut details = json!(report);
        details["threshold"] = json!(threshold);
        (status, details)
    }
}

fn smoke(
    subject: &SubjectFunction,
    example: &Kwargs,
    degraded: &BTreeSet<String>,
) -> (ObligationKind, Outcome) {
    let args = copy_args(example);
    let result = match subject.invoke(&args) {
        Ok(result) => result,
        Err(e) => {
            return (
                ObligationKind::ContractsSmoke,
                (
                    Status::Fail,
                    json!({ "example": args_json(example), "error": e.to_string() }),
                ),
            )
        }
    };
    if let Err(v) = subject.check_ensures(&args, &result) {
        return (
            ObligationKind::EnsuresHoldsOnSmoke,
            (
                Status::Fail,
                json!({
                    "example": args_json(example),
                    "result": result.to_json(),
                    "error": v.to_string(),
                }),
            ),
        );
    }
    let bundle = subject.bundle();
    let mut details = json!({
        "example": args_json(example),
        "result": result.to_json(),
        "requires": bundle.requires.len(),
        "ensures": bundle.ensures.len(),
    });
    if !degraded.is_empty() {
        details["degraded_types"] = json!(degraded);
    }
    (ObligationKind::ContractsSmoke, (Status::Pass, details))
}

fn static_purity(subject: &SubjectFunction, config: &PurityConfig) -> Outcome {
    let mode = config.mode();
    let warnings = purity::static_check(subject.callable(), mode);
    if warnings.is_empty() {
        (
            Status::Pass,
            json!({ "mode": mode, "message": "no impure operations detected" }),
        )
    } else {
        (Status::Fail, json!({ "mode": mode, "warnings": warnings }))
    }
}

fn dynamic_purity(subject: &SubjectFunction, config: &PurityConfig, example: &Kwargs) -> Outcome {
    let mode = config.mode();
    match purity::dynamic_check(subject.callable(), example, config) {
        Ok(DynamicOutcome::Pure) => (
            Status::Pass,
            json!({ "mode": mode, "example": args_json(example) }),
        ),
        Ok(DynamicOutcome::Impure(error)) => (
            Status::Fail,
            json!({ "mode": mode, "example": args_json(example), "error": error }),
        ),
        Err(e) => (Status::Error, json!({ "mode": mode, "error": e.to_string() })),
    }
}

fn unavailable(what: &str) -> Outcome {
    (Status::Skip, json!({ "reason": format!("{what} unavailable") }))
}

/// Runs `f` with the step budget of `host` set to `fuel`.
fn with_fuel<T>(host: &Host, fuel: u64, f: impl FnOnce() -> T) -> T {
    host.with_limits(
        Limits {
            max_steps: fuel,
            ..host.limits()
        },
        f,
    )
}
