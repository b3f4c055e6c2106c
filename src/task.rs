//! A typed description of a single call into the data reduction toolkit.
//!
//! Every operation the pipeline performs is a [`TaskCall`]: a task name and
//! an ordered list of named parameters. Backends decide what to do with it;
//! [`TaskCall::render_python`] gives the CASA syntax.

use std::fmt::Display;

use itertools::Itertools;

/// The name of the pseudo-task which copies a directory tree on disk.
pub const COPYTREE: &str = "copytree";

/// A parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    /// A string
    Str(String),
    /// A boolean
    Bool(bool),
    /// An integer
    Int(i64),
    /// A float, always rendered with a decimal point
    Float(f64),
    /// A list of strings
    StrList(Vec<String>),
    /// A list of integers
    IntList(Vec<i64>),
    /// A list of floats
    FloatList(Vec<f64>),
}

fn python_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn python_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl TaskValue {
    /// Render the value as a python literal.
    pub fn render_python(&self) -> String {
        match self {
            TaskValue::Str(s) => python_str(s),
            TaskValue::Bool(true) => "True".into(),
            TaskValue::Bool(false) => "False".into(),
            TaskValue::Int(i) => i.to_string(),
            TaskValue::Float(f) => python_float(*f),
            TaskValue::StrList(v) => format!("[{}]", v.iter().map(|s| python_str(s)).join(",")),
            TaskValue::IntList(v) => format!("[{}]", v.iter().join(", ")),
            TaskValue::FloatList(v) => format!("[{}]", v.iter().map(|&f| python_float(f)).join(",")),
        }
    }

    /// The inner string, if this is a [`TaskValue::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TaskValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The inner bool, if this is a [`TaskValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TaskValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The inner strings, if this is a [`TaskValue::StrList`].
    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            TaskValue::StrList(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl From<&str> for TaskValue {
    fn from(s: &str) -> Self {
        TaskValue::Str(s.to_string())
    }
}

impl From<String> for TaskValue {
    fn from(s: String) -> Self {
        TaskValue::Str(s)
    }
}

impl From<&String> for TaskValue {
    fn from(s: &String) -> Self {
        TaskValue::Str(s.clone())
    }
}

impl From<bool> for TaskValue {
    fn from(b: bool) -> Self {
        TaskValue::Bool(b)
    }
}

impl From<i64> for TaskValue {
    fn from(i: i64) -> Self {
        TaskValue::Int(i)
    }
}

impl From<u32> for TaskValue {
    fn from(i: u32) -> Self {
        TaskValue::Int(i.into())
    }
}

impl From<f64> for TaskValue {
    fn from(f: f64) -> Self {
        TaskValue::Float(f)
    }
}

impl From<Vec<String>> for TaskValue {
    fn from(v: Vec<String>) -> Self {
        TaskValue::StrList(v)
    }
}

impl From<Vec<i64>> for TaskValue {
    fn from(v: Vec<i64>) -> Self {
        TaskValue::IntList(v)
    }
}

impl From<Vec<f64>> for TaskValue {
    fn from(v: Vec<f64>) -> Self {
        TaskValue::FloatList(v)
    }
}

/// One call into the toolkit.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCall {
    /// The toolkit task, e.g. `gaincal`
    pub task: String,
    /// Named parameters, in the order they are rendered
    pub params: Vec<(String, TaskValue)>,
}

impl TaskCall {
    /// Start a call to `task` with no parameters.
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            params: vec![],
        }
    }

    /// Copy the directory `src` to `dst`.
    pub fn copytree(src: &str, dst: &str) -> Self {
        Self::new(COPYTREE).arg("src", src).arg("dst", dst)
    }

    /// Append a parameter. If `name` is already set, its value is replaced in
    /// place.
    #[must_use]
    pub fn arg<V: Into<TaskValue>>(mut self, name: &str, value: V) -> Self {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.params.push((name.to_string(), value)),
        }
        self
    }

    /// Append a parameter only when `value` is `Some`.
    #[must_use]
    pub fn arg_opt<V: Into<TaskValue>>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.arg(name, value),
            None => self,
        }
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&TaskValue> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Shorthand for a string parameter.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(TaskValue::as_str)
    }

    /// Render as a line of CASA python.
    ///
    /// ```
    /// use meercal::task::TaskCall;
    ///
    /// let call = TaskCall::new("flagdata")
    ///     .arg("vis", "obs.ms")
    ///     .arg("autocorr", true);
    /// assert_eq!(call.render_python(), "flagdata(vis='obs.ms',autocorr=True)");
    /// ```
    pub fn render_python(&self) -> String {
        if self.task == COPYTREE {
            return format!(
                "shutil.copytree({},{})",
                self.get("src").map(TaskValue::render_python).unwrap_or_default(),
                self.get("dst").map(TaskValue::render_python).unwrap_or_default(),
            );
        }
        format!(
            "{}({})",
            self.task,
            self.params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.render_python()))
                .join(",")
        )
    }
}

impl Display for TaskCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_python())
    }
}
