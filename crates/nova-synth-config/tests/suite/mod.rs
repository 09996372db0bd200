mod load;
mod tracing_setup;
