//! Immutable descriptions of what the host tree should look like.
//!
//! An [`Element`] is produced fresh on every render entry point and never
//! mutated afterwards. Its kind is either a host tag (a primitive node the
//! [`Host`](crate::Host) knows how to create) or a [`Component`], a render
//! function that expands into further elements.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::hash::hash_one;
use crate::Key;

/// Tag used for primitive text elements.
pub const TEXT_TAG: &str = "TEXT";
/// Property carrying the text of a [`TEXT_TAG`] element.
pub const NODE_VALUE: &str = "nodeValue";
/// Property keys starting with this prefix register listeners.
pub const EVENT_PREFIX: &str = "on";
/// Reserved key; children live in [`Props::children`] and never reach the host.
pub const CHILDREN: &str = "children";

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    pub const fn from_static(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_text(&self) -> bool {
        self.0 == TEXT_TAG
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag(Cow::Owned(name))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

type RenderFn = dyn Fn(&Props) -> Element;

/// A user-defined render function.
///
/// Identity is the component's name; [`Component::key`] is its hash. Two
/// `Component` values built from the same name are the same kind to the
/// reconciler even though they hold distinct closures. Closures defined
/// inside the same function share a type name; give those an explicit name
/// with [`Component::new`].
#[derive(Clone)]
pub struct Component {
    key: Key,
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new(name: &'static str, render: impl Fn(&Props) -> Element + 'static) -> Self {
        Self {
            key: hash_one(name),
            name,
            render: Rc::new(render),
        }
    }

    /// Names the component after the render function's type.
    pub fn from_fn<F>(render: F) -> Self
    where
        F: Fn(&Props) -> Element + 'static,
    {
        Self::new(std::any::type_name::<F>(), render)
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, props: &Props) -> Element {
        (self.render)(props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.name == other.name
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Host(Tag),
    Component(Component),
}

impl ElementKind {
    pub fn label(&self) -> &str {
        match self {
            ElementKind::Host(tag) => tag.as_str(),
            ElementKind::Component(component) => component.name(),
        }
    }
}

impl From<Tag> for ElementKind {
    fn from(tag: Tag) -> Self {
        ElementKind::Host(tag)
    }
}

impl From<&'static str> for ElementKind {
    fn from(tag: &'static str) -> Self {
        ElementKind::Host(Tag::from(tag))
    }
}

impl From<Component> for ElementKind {
    fn from(component: Component) -> Self {
        ElementKind::Component(component)
    }
}

impl From<&Component> for ElementKind {
    fn from(component: &Component) -> Self {
        ElementKind::Component(component.clone())
    }
}

/// Event callback stored in a property bag.
///
/// Listeners compare by identity: a freshly built closure is a changed value
/// even when its body is the same.
#[derive(Clone)]
pub struct Listener(Rc<dyn Fn()>);

impl Listener {
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Listener(Rc::new(callback))
    }

    pub fn call(&self) {
        (self.0)()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Listener(Listener),
}

impl PropValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_listener(&self) -> Option<&Listener> {
        match self {
            PropValue::Listener(listener) => Some(listener),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Text(text) => write!(f, "{text:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Listener(_) => f.write_str("<listener>"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<Listener> for PropValue {
    fn from(value: Listener) -> Self {
        PropValue::Listener(value)
    }
}

/// Returns the event name for a listener key (`onClick` -> `click`).
pub fn event_name(key: &str) -> Option<String> {
    let rest = key.strip_prefix(EVENT_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase())
}

/// Insertion-ordered property bag plus the element's children.
#[derive(Clone, Default)]
pub struct Props {
    attributes: Vec<(String, PropValue)>,
    children: Vec<Element>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_children(children: Vec<Element>) -> Self {
        Self {
            attributes: Vec::new(),
            children,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Registers `callback` under `on<Event>`, e.g. `on("click", ..)` sets `onClick`.
    pub fn on(self, event: &str, callback: impl Fn() + 'static) -> Self {
        let mut chars = event.chars();
        let key = match chars.next() {
            Some(first) => format!("{EVENT_PREFIX}{}{}", first.to_uppercase(), chars.as_str()),
            None => EVENT_PREFIX.to_owned(),
        };
        self.with(key, Listener::new(callback))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropValue>) {
        let name = name.into();
        if name == CHILDREN {
            log::warn!("ignoring attribute named `{CHILDREN}`; pass children to make_element");
            return;
        }
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &PropValue)> + '_ {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.attributes {
            map.entry(key, value);
        }
        map.entry(&CHILDREN, &self.children.len());
        map.finish()
    }
}

#[derive(Clone)]
pub struct Element {
    kind: ElementKind,
    props: Rc<Props>,
}

impl Element {
    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn props(&self) -> &Rc<Props> {
        &self.props
    }

    pub fn children(&self) -> &[Element] {
        self.props.children()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind)
            .field("props", &self.props)
            .field("children", &self.props.children)
            .finish()
    }
}

/// Anything that may appear in a child list.
///
/// Non-element values become [`TEXT_TAG`] elements.
#[derive(Clone, Debug)]
pub enum Child {
    Element(Element),
    Text(String),
}

impl Child {
    fn into_element(self) -> Element {
        match self {
            Child::Element(element) => element,
            Child::Text(text) => text_element(text),
        }
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Element(element)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_owned())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

macro_rules! child_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Child::Text(value.to_string())
                }
            }
        )*
    };
}

child_from_display!(i32, i64, u32, u64, usize, f32, f64, bool);

pub fn make_element(
    kind: impl Into<ElementKind>,
    props: Props,
    children: impl IntoIterator<Item = Child>,
) -> Element {
    let mut props = props;
    props.children = children.into_iter().map(Child::into_element).collect();
    Element {
        kind: kind.into(),
        props: Rc::new(props),
    }
}

pub fn text_element(text: impl Into<String>) -> Element {
    make_element(
        Tag::from_static(TEXT_TAG),
        Props::new().with(NODE_VALUE, text.into()),
        [],
    )
}

pub fn host(
    tag: impl Into<Tag>,
    props: Props,
    children: impl IntoIterator<Item = Child>,
) -> Element {
    make_element(ElementKind::Host(tag.into()), props, children)
}

pub fn component(component: &Component, props: Props) -> Element {
    make_element(component, props, [])
}

/// Builds a `Vec<Child>` from mixed elements and text-like values.
#[macro_export]
macro_rules! children {
    ($($child:expr),* $(,)?) => {
        vec![$($crate::Child::from($child)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_children_are_normalized() {
        let element = host("h1", Props::new(), children!["Count: ", 1]);
        let kinds: Vec<_> = element.children().iter().map(|c| c.kind().clone()).collect();
        assert_eq!(kinds, vec![ElementKind::from(TEXT_TAG), ElementKind::from(TEXT_TAG)]);
        let texts: Vec<_> = element
            .children()
            .iter()
            .map(|c| c.props().get(NODE_VALUE).and_then(PropValue::as_text).unwrap().to_owned())
            .collect();
        assert_eq!(texts, vec!["Count: ".to_owned(), "1".to_owned()]);
    }

    #[test]
    fn children_key_is_reserved() {
        let props = Props::new().with("id", "a").with(CHILDREN, "nope");
        assert!(props.get(CHILDREN).is_none());
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn on_builds_event_key() {
        let props = Props::new().on("click", || {});
        let (key, value) = props.attributes().next().unwrap();
        assert_eq!(key, "onClick");
        assert_eq!(event_name(key).as_deref(), Some("click"));
        assert!(value.as_listener().is_some());
    }

    #[test]
    fn components_with_same_name_are_same_kind() {
        fn render(_: &Props) -> Element {
            text_element("x")
        }
        let a = Component::new("Thing", render);
        let b = Component::new("Thing", |_| text_element("y"));
        let c = Component::new("Other", render);
        assert_eq!(ElementKind::from(&a), ElementKind::from(&b));
        assert_ne!(ElementKind::from(&a), ElementKind::from(&c));
    }

    #[test]
    fn colliding_keys_with_different_names_stay_distinct() {
        let a = Component::new("Thing", |_| text_element("x"));
        let forged = Component {
            name: "Other",
            ..a.clone()
        };
        assert_eq!(a.key(), forged.key());
        assert_ne!(a, forged);
    }

    #[test]
    fn listeners_compare_by_identity() {
        let a = Listener::new(|| {});
        let b = a.clone();
        let c = Listener::new(|| {});
        assert_eq!(PropValue::from(a.clone()), PropValue::from(b));
        assert_ne!(PropValue::from(a), PropValue::from(c));
    }
}
