///
/// BeforeUseAction
/// What happens to a temporary table before a handler uses it.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BeforeUseAction {
    Create,
    None,
}

///
/// AfterUseAction
/// What happens to a temporary table after a handler used it, on every
/// exit path.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AfterUseAction {
    Clean,
    Drop,
    None,
}
