use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::error::Error;

use cardiorisk::context::SharedContext;
use cardiorisk::download::HttpFetcher;
use cardiorisk::form::{
    CATEGORICAL_FIELDS, CONTINUOUS_FIELDS, CategoricalField, ContinuousField, FormError,
    PatientForm,
};

use super::{OutputArgs, report};

/// Why a prompt loop stopped before producing a value.
enum Stop {
    Quit,
    Failed(ReadlineError),
    Rejected(FormError),
}

impl From<ReadlineError> for Stop {
    fn from(e: ReadlineError) -> Self {
        match e {
            ReadlineError::Eof | ReadlineError::Interrupted => Stop::Quit,
            other => Stop::Failed(other),
        }
    }
}

/// Interactive form session. Artifacts are loaded before the first prompt so a
/// missing model is reported immediately, and are reused for every patient.
pub fn run(shared: &SharedContext, output: &OutputArgs) -> Result<(), Box<dyn Error>> {
    let context = shared.get_or_load(&HttpFetcher)?;
    let mut editor = DefaultEditor::new()?;

    println!("Enter the patient's clinical variables. Press Enter to keep the value in brackets.");
    loop {
        let form = match fill_form(&mut editor) {
            Ok(form) => form,
            Err(Stop::Quit) => return Ok(()),
            Err(Stop::Failed(e)) => return Err(e.into()),
            Err(Stop::Rejected(e)) => return Err(e.into()),
        };

        println!();
        print!("{form}");
        match editor.readline("Press Enter to calculate risk (q to quit): ") {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => return Ok(()),
            Ok(_) => {}
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        match context.assess(&form) {
            Ok(assessment) => {
                if let Err(e) = report(&assessment, output) {
                    eprintln!("Error: {e}");
                }
            }
            // A failed computation shows no risk at all, then the session continues.
            Err(e) => eprintln!("Error: {e}"),
        }

        match editor.readline("Assess another patient? [y/N] ") {
            Ok(line) if line.trim().eq_ignore_ascii_case("y") => println!(),
            Ok(_) | Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

fn fill_form(editor: &mut DefaultEditor) -> Result<PatientForm, Stop> {
    let mut form = PatientForm::default();
    for field in &CONTINUOUS_FIELDS {
        let value = ask_number(editor, field)?;
        form.set_value(field.name, value).map_err(Stop::Rejected)?;
    }
    for field in &CATEGORICAL_FIELDS {
        let option = ask_option(editor, field)?;
        form.select(field.name, option).map_err(Stop::Rejected)?;
    }
    Ok(form)
}

/// Re-prompts until the entry is accepted by the field's range check.
fn ask_number(editor: &mut DefaultEditor, field: &ContinuousField) -> Result<f64, Stop> {
    let prompt = format!("{} [{}]: ", field.label, field.default);
    loop {
        let line = editor.readline(&prompt)?;
        let text = line.trim();
        if text.is_empty() {
            return Ok(field.default);
        }
        match text.parse::<f64>() {
            Ok(value) => match field.check(value) {
                Ok(value) => return Ok(value),
                Err(e) => eprintln!("  {e}"),
            },
            Err(_) => eprintln!("  '{text}' is not a number"),
        }
    }
}

/// Accepts either the option's number or its text.
fn ask_option(editor: &mut DefaultEditor, field: &CategoricalField) -> Result<&'static str, Stop> {
    println!("{}:", field.label());
    for (idx, option) in field.options.iter().enumerate() {
        println!("  {}) {option}", idx + 1);
    }
    let prompt = format!("{} [{}]: ", field.label(), field.baseline());
    loop {
        let line = editor.readline(&prompt)?;
        let text = line.trim();
        if text.is_empty() {
            return Ok(field.baseline());
        }
        if let Ok(number) = text.parse::<usize>() {
            if (1..=field.options.len()).contains(&number) {
                return Ok(field.options[number - 1]);
            }
        }
        match field.position(text) {
            Ok(idx) => return Ok(field.options[idx]),
            Err(e) => eprintln!("  {e}"),
        }
    }
}
