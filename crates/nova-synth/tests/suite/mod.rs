mod evaluation;
mod generation;
mod scenarios;
