//! Recorded step model
//!
//! Steps are persisted and exchanged with the UI as flat camelCase JSON
//! (`{"type": "assert", "subType": "assertTextEquals", "expectedText": ...}`),
//! while in Rust the step kind is a tagged union so that every kind only
//! carries the expectation fields that make sense for it.

use crate::error::{RecorderError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ===== IDENTITY =====

/// Identity of a step or conditional block.
///
/// Serialized as a JSON number: creation time in milliseconds plus a random
/// fraction. Only uniqueness is guaranteed; sibling order lives in the arrays.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct StepId(pub f64);

/// Accepts a number or a numeric string (ids read back from the DOM)
impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(StepId(n)),
            Raw::Text(s) => s.trim().parse().map(StepId).map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== ELEMENT DESCRIPTOR =====

/// Element description produced by the page-observation collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Selectors>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Current value of form controls
    #[serde(default)]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Option<String>>,

    /// All `data-*` attributes of the element
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data_attributes: IndexMap<String, String>,

    /// Set when the element lives inside an iframe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_info: Option<FrameInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_outer_html: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,

    /// Fields this crate does not interpret, kept for the code generator
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementDescriptor {
    /// Descriptor used for `switch_to_iframe` steps
    pub fn for_frame(frame: &FrameInfo) -> Self {
        Self {
            selectors: Some(Selectors {
                full_xpath: frame.xpath.clone(),
                ..Default::default()
            }),
            tag: Some("iframe".to_string()),
            ..Default::default()
        }
    }

    pub fn full_xpath(&self) -> Option<&str> {
        self.selectors.as_ref()?.full_xpath.as_deref()
    }
}

/// Selector candidates collected for an element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,

    /// `//tag[.="text"]` style xpath
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath_text: Option<String>,

    /// Absolute xpath, relative to `<body>` when possible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_xpath: Option<String>,
}

/// The iframe an element was found in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub xpath: Option<String>,
}

/// Bounding client rectangle in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Rect {
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

// ===== STEP KINDS =====

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepAction {
    #[serde(rename = "click")]
    Click,

    #[serde(rename = "right_click")]
    RightClick,

    #[serde(rename = "double_click", alias = "doubleClick")]
    DoubleClick,

    #[serde(rename = "hover")]
    Hover,

    #[serde(rename = "input")]
    Input,

    #[serde(rename = "select")]
    Select,

    #[serde(rename = "getText", rename_all = "camelCase")]
    GetText {
        #[serde(default)]
        expected_text: Option<String>,
    },

    #[serde(rename = "wait")]
    Wait(WaitCondition),

    #[serde(rename = "assert")]
    Assert(Assertion),

    #[serde(rename = "switch_to_iframe")]
    SwitchToIframe,

    #[serde(rename = "switch_to_default_content")]
    SwitchToDefaultContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subType")]
pub enum WaitCondition {
    #[serde(rename = "waitVisible")]
    Visible,

    #[serde(rename = "waitInvisible")]
    Invisible,

    #[serde(rename = "waitClickable")]
    Clickable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subType")]
pub enum Assertion {
    #[serde(rename = "assertVisible")]
    Visible,

    #[serde(rename = "assertNotVisible")]
    NotVisible,

    #[serde(rename = "assertIsClickable")]
    IsClickable,

    #[serde(rename = "assertIsNotClickable")]
    IsNotClickable,

    #[serde(rename = "assertIsEnabled")]
    IsEnabled,

    #[serde(rename = "assertIsDisabled")]
    IsDisabled,

    #[serde(rename = "assertTextEquals", rename_all = "camelCase")]
    TextEquals {
        #[serde(default)]
        expected_text: Option<String>,
    },

    #[serde(rename = "assertValueEquals", rename_all = "camelCase")]
    ValueEquals {
        #[serde(default)]
        expected_value: Option<String>,
    },

    #[serde(rename = "assertHasCssClass", rename_all = "camelCase")]
    HasCssClass {
        #[serde(default)]
        expected_css_class: String,
    },

    #[serde(rename = "assertAttribute", rename_all = "camelCase")]
    Attribute {
        #[serde(default)]
        expected_attribute_name: String,
        #[serde(default)]
        expected_attribute_value: String,
    },
}

impl WaitCondition {
    pub fn parse(sub_type: &str) -> Option<Self> {
        match sub_type {
            "waitVisible" => Some(Self::Visible),
            "waitInvisible" => Some(Self::Invisible),
            "waitClickable" => Some(Self::Clickable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "waitVisible",
            Self::Invisible => "waitInvisible",
            Self::Clickable => "waitClickable",
        }
    }
}

impl Assertion {
    /// Build an assertion and its expectation scaffolding from the element
    pub fn parse(sub_type: &str, data: &ElementDescriptor) -> Option<Self> {
        let assertion = match sub_type {
            "assertVisible" => Self::Visible,
            "assertNotVisible" => Self::NotVisible,
            "assertIsClickable" => Self::IsClickable,
            "assertIsNotClickable" => Self::IsNotClickable,
            "assertIsEnabled" => Self::IsEnabled,
            "assertIsDisabled" => Self::IsDisabled,
            "assertTextEquals" => Self::TextEquals {
                expected_text: data.text.clone(),
            },
            "assertValueEquals" => Self::ValueEquals {
                expected_value: data.value.clone(),
            },
            "assertHasCssClass" => Self::HasCssClass {
                expected_css_class: String::new(),
            },
            "assertAttribute" => Self::Attribute {
                expected_attribute_name: String::new(),
                expected_attribute_value: String::new(),
            },
            _ => return None,
        };
        Some(assertion)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "assertVisible",
            Self::NotVisible => "assertNotVisible",
            Self::IsClickable => "assertIsClickable",
            Self::IsNotClickable => "assertIsNotClickable",
            Self::IsEnabled => "assertIsEnabled",
            Self::IsDisabled => "assertIsDisabled",
            Self::TextEquals { .. } => "assertTextEquals",
            Self::ValueEquals { .. } => "assertValueEquals",
            Self::HasCssClass { .. } => "assertHasCssClass",
            Self::Attribute { .. } => "assertAttribute",
        }
    }
}

impl StepAction {
    /// Resolve a `(type, subType)` pair coming from the page or a menu.
    ///
    /// `assert` and `wait` default to their "visible" flavour when no
    /// sub-type is given.
    pub fn from_parts(
        step_type: &str,
        sub_type: Option<&str>,
        data: &ElementDescriptor,
    ) -> Result<Self> {
        let unknown = || RecorderError::UnknownStepType(describe(step_type, sub_type));
        let action = match step_type {
            "click" => Self::Click,
            "right_click" => Self::RightClick,
            "double_click" | "doubleClick" => Self::DoubleClick,
            "hover" => Self::Hover,
            "input" => Self::Input,
            "select" => Self::Select,
            "getText" => Self::GetText {
                expected_text: data.text.clone(),
            },
            "wait" => Self::Wait(
                WaitCondition::parse(sub_type.unwrap_or("waitVisible")).ok_or_else(unknown)?,
            ),
            "assert" => Self::Assert(
                Assertion::parse(sub_type.unwrap_or("assertVisible"), data)
                    .ok_or_else(unknown)?,
            ),
            "switch_to_iframe" => Self::SwitchToIframe,
            "switch_to_default_content" => Self::SwitchToDefaultContent,
            _ => return Err(unknown()),
        };
        Ok(action)
    }

    /// Wire value of the `type` field
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::RightClick => "right_click",
            Self::DoubleClick => "double_click",
            Self::Hover => "hover",
            Self::Input => "input",
            Self::Select => "select",
            Self::GetText { .. } => "getText",
            Self::Wait(_) => "wait",
            Self::Assert(_) => "assert",
            Self::SwitchToIframe => "switch_to_iframe",
            Self::SwitchToDefaultContent => "switch_to_default_content",
        }
    }

    /// Wire value of the `subType` field, if the kind has one
    pub fn sub_type(&self) -> Option<&'static str> {
        match self {
            Self::Wait(condition) => Some(condition.as_str()),
            Self::Assert(assertion) => Some(assertion.as_str()),
            _ => None,
        }
    }

    /// Sub-type when present, otherwise the type
    pub fn label(&self) -> &'static str {
        self.sub_type().unwrap_or_else(|| self.type_name())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input)
    }

    pub fn expected_text(&self) -> Option<&str> {
        match self {
            Self::GetText { expected_text } => expected_text.as_deref(),
            Self::Assert(Assertion::TextEquals { expected_text }) => expected_text.as_deref(),
            _ => None,
        }
    }

    /// Drop literal expectations once a variable supplies the value
    pub fn clear_literal_expectations(&mut self) {
        match self {
            Self::GetText { expected_text } => *expected_text = None,
            Self::Assert(Assertion::TextEquals { expected_text }) => *expected_text = None,
            Self::Assert(Assertion::ValueEquals { expected_value }) => *expected_value = None,
            _ => {}
        }
    }
}

fn describe(step_type: &str, sub_type: Option<&str>) -> String {
    match sub_type {
        Some(sub) => format!("{}/{}", step_type, sub),
        None => step_type.to_string(),
    }
}

// ===== STEPS AND BLOCKS =====

/// Generated page-object fragments for one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepCode {
    #[serde(rename = "methodDefinition", default)]
    pub definition: String,

    #[serde(rename = "methodCall", default)]
    pub call: String,
}

/// Boolean form of an assertion, used when the step is an IF condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanCheck {
    pub method_name: String,
    pub locator_var_name: String,
}

/// A single recorded action or check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: StepId,

    #[serde(flatten)]
    pub action: StepAction,

    #[serde(default)]
    pub data: ElementDescriptor,

    /// Cropped element screenshot as a data URL
    #[serde(default)]
    pub screenshot: Option<String>,

    /// Variable receiving the result (getText)
    #[serde(default)]
    pub variable_name: Option<String>,

    /// Variable supplying the value instead of a literal
    #[serde(default)]
    pub variable_for_value: Option<String>,

    #[serde(default)]
    pub locators: Vec<String>,

    #[serde(default)]
    pub code: StepCode,

    #[serde(default)]
    pub allure_step: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_check: Option<BooleanCheck>,
}

impl Step {
    /// Variable used as the generated method's argument, if any
    pub fn argument_variable(&self) -> Option<&str> {
        non_empty(self.variable_for_value.as_deref()).or(non_empty(self.variable_name.as_deref()))
    }

    pub fn is_parameterized(&self) -> bool {
        non_empty(self.variable_for_value.as_deref()).is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockTag {
    #[serde(rename = "conditional")]
    Conditional,
}

/// Which branch of a conditional block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    #[default]
    Then,
    Else,
}

/// A recorded IF/ELSE construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBlock {
    pub id: StepId,

    #[serde(rename = "type")]
    pub tag: BlockTag,

    /// Always an `assertVisible` check
    pub condition: Step,

    #[serde(default)]
    pub then_steps: Vec<StepNode>,

    #[serde(default)]
    pub else_steps: Vec<StepNode>,

    #[serde(rename = "isFinalized", default)]
    pub is_finalized: bool,
}

impl ConditionalBlock {
    pub fn new(id: StepId, condition: Step) -> Self {
        Self {
            id,
            tag: BlockTag::Conditional,
            condition,
            then_steps: Vec::new(),
            else_steps: Vec::new(),
            is_finalized: false,
        }
    }

    pub fn branch(&self, branch: Branch) -> &Vec<StepNode> {
        match branch {
            Branch::Then => &self.then_steps,
            Branch::Else => &self.else_steps,
        }
    }

    pub fn branch_mut(&mut self, branch: Branch) -> &mut Vec<StepNode> {
        match branch {
            Branch::Then => &mut self.then_steps,
            Branch::Else => &mut self.else_steps,
        }
    }
}

/// An entry of a step array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepNode {
    Conditional(ConditionalBlock),
    Step(Step),
}

impl StepNode {
    pub fn id(&self) -> StepId {
        match self {
            Self::Conditional(block) => block.id,
            Self::Step(step) => step.id,
        }
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Self::Step(step) => Some(step),
            Self::Conditional(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&ConditionalBlock> {
        match self {
            Self::Conditional(block) => Some(block),
            Self::Step(_) => None,
        }
    }
}

impl From<Step> for StepNode {
    fn from(step: Step) -> Self {
        Self::Step(step)
    }
}

impl From<ConditionalBlock> for StepNode {
    fn from(block: ConditionalBlock) -> Self {
        Self::Conditional(block)
    }
}
