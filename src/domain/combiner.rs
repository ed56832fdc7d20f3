//! Signal combiner: one boolean entry series per module, folded with AND.
//!
//! Modules declaring `SignalPath::Vectorized` produce their series with one
//! `entry_flags` call. If that call fails, or returns the wrong length, the
//! module is evaluated row by row instead. Row-wise evaluation gives the
//! module a view that ends at the evaluated row and counts per-row errors as
//! `false`. Rows before a module's warm-up are `false` on both paths.

use crate::domain::event::Event;
use crate::domain::module::{ColumnNames, ConfiguredModule, ModuleView, SignalPath};
use crate::domain::series::Series;
use crate::domain::strategy::Direction;
use crate::ports::event_port::EventSink;

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSignal {
    pub label: String,
    pub path: SignalPath,
    pub fell_back: bool,
    pub positives: usize,
    pub row_errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalReport {
    /// Combined entry signal, one value per series row.
    pub entries: Vec<bool>,
    pub modules: Vec<ModuleSignal>,
}

impl SignalReport {
    pub fn positives(&self) -> usize {
        self.entries.iter().filter(|e| **e).count()
    }
}

fn row_wise(
    view: &ModuleView<'_>,
    configured: &ConfiguredModule,
    direction: Direction,
) -> (Vec<bool>, usize) {
    let mut errors = 0;
    let flags = (0..view.len())
        .map(|i| {
            configured
                .module
                .check_entry_condition(&view.upto(i), i, &configured.config, direction)
                .unwrap_or_else(|_| {
                    errors += 1;
                    false
                })
        })
        .collect();
    (flags, errors)
}

/// Boolean entry series of a single module.
pub fn module_signal(
    series: &Series,
    names: &ColumnNames,
    configured: &ConfiguredModule,
    direction: Direction,
) -> (Vec<bool>, ModuleSignal) {
    let view = ModuleView::new(series, names);
    let path = configured.module.signal_path();

    let vectorized = match path {
        SignalPath::Vectorized => configured
            .module
            .entry_flags(&view, &configured.config, direction)
            .ok()
            .filter(|flags| flags.len() == series.len()),
        SignalPath::RowWise => None,
    };
    let fell_back = path == SignalPath::Vectorized && vectorized.is_none();
    let (mut flags, row_errors) = match vectorized {
        Some(flags) => (flags, 0),
        None => row_wise(&view, configured, direction),
    };

    let warmup = configured.module.warmup(&configured.config).min(flags.len());
    flags[..warmup].fill(false);

    let signal = ModuleSignal {
        label: configured.label().to_string(),
        path,
        fell_back,
        positives: flags.iter().filter(|f| **f).count(),
        row_errors,
    };
    (flags, signal)
}

/// Evaluate every module and AND their entry series. `names[i]` holds the
/// column renames of `modules[i]`; a missing entry means no renames.
pub fn combine(
    series: &Series,
    modules: &[ConfiguredModule],
    names: &[ColumnNames],
    direction: Direction,
    events: &dyn EventSink,
) -> SignalReport {
    let no_renames = ColumnNames::new();
    let mut entries = vec![true; series.len()];
    let mut reports = Vec::with_capacity(modules.len());

    for (i, configured) in modules.iter().enumerate() {
        let module_names = names.get(i).unwrap_or(&no_renames);
        let (flags, signal) = module_signal(series, module_names, configured, direction);
        for (entry, flag) in entries.iter_mut().zip(&flags) {
            *entry &= *flag;
        }
        events.emit(Event::ModuleSignals {
            label: signal.label.clone(),
            path: signal.path,
            fell_back: signal.fell_back,
            positives: signal.positives,
            row_errors: signal.row_errors,
        });
        reports.push(signal);
    }

    SignalReport {
        entries,
        modules: reports,
    }
}
