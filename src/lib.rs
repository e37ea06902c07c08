//! # markowitz-rs
//!
//! $$
//! \max_{\mathbf w}\ \frac{\mathbf w^\top\mu-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ \ell\le\mathbf w\le u
//! $$
//!
//! Mean-variance portfolio construction from price histories.
//!
//! - [`portfolio`]: return series, shrinkage risk model, optimizers, Monte
//!   Carlo sampler, efficient frontier and the analysis engine.
//! - [`io`]: CSV price tables.
//! - [`visualization`]: plotly charts of an analysis run.

pub mod io;
pub mod portfolio;
pub mod visualization;
