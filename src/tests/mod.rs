//! Test modules for the pipeline

#[cfg(test)]
mod support;


#[cfg(test)]
mod interceptor_tests;

#[cfg(test)]
mod pipeline_tests;
