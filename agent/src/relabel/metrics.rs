use log::warn;
use prometheus::core::Collector;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

const COMPONENT_ID_LABEL: &str = "component_id";

#[derive(Clone)]
pub struct Metrics {
    pub cycles: IntCounter,
    pub cycle_failures: IntCounter,
    pub unchanged_cycles: IntCounter,
    pub cycle_duration: Histogram,
    pub output_targets: IntGauge,
}

impl Metrics {
    pub(crate) fn new(reg: &Registry, component_id: &str) -> prometheus::Result<Metrics> {
        let opts = |name: &str, help: &str| Opts::new(name, help).const_label(COMPONENT_ID_LABEL, component_id);

        let cycles = register(
            reg,
            IntCounter::with_opts(opts(
                "relabel_script_cycles_total",
                "Total number of discovery cycles passed through the relabel script.",
            ))?,
        );
        let cycle_failures = register(
            reg,
            IntCounter::with_opts(opts(
                "relabel_script_cycle_failures_total",
                "Total number of discovery cycles the relabel script failed on.",
            ))?,
        );
        let unchanged_cycles = register(
            reg,
            IntCounter::with_opts(opts(
                "relabel_script_unchanged_cycles_total",
                "Total number of cycles whose output matched the previous output.",
            ))?,
        );
        let cycle_duration = register(
            reg,
            Histogram::with_opts(
                HistogramOpts::new(
                    "relabel_script_cycle_duration_seconds",
                    "Time spent running the relabel script for one discovery cycle.",
                )
                .const_label(COMPONENT_ID_LABEL, component_id),
            )?,
        );
        let output_targets = register(
            reg,
            IntGauge::with_opts(opts(
                "relabel_script_output_targets",
                "Number of targets currently exported by the relabel script.",
            ))?,
        );

        Ok(Metrics {
            cycles,
            cycle_failures,
            unchanged_cycles,
            cycle_duration,
            output_targets,
        })
    }
}

// Registration fails when another component already registered the same
// series; the collector still counts, it just is not exported twice.
fn register<C>(reg: &Registry, collector: C) -> C
where
    C: Collector + Clone + 'static,
{
    if let Err(err) = reg.register(Box::new(collector.clone())) {
        warn!("failed to register metric: {}", err);
    }
    collector
}
